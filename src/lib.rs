// THEORY:
// This file is the main entry point for the `green_view` library crate. It
// estimates how much of a street-level view is vegetation: each 400x400
// panorama tile is segmented into region averages, a green-excess index is
// thresholded with an Otsu split clamped to a tuned band, shadowed foliage is
// caught by a separate rule, and the resulting mask becomes a percentage.
// Six such tiles around a panorama average into its green view index.
//
// The public API is deliberately small:
// - `GreenViewPipeline` classifies one tile (`pipeline`).
// - `measure_panorama` and `PanoramaLedger` cover one panorama (`panorama`).
// - `ParallelPipeline` measures batches on a worker pool (`parallel_pipeline`).
// The kernel stages in `core_modules` are public for callers that need a
// single stage, such as `graythresh`, on its own.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod logging;
pub mod panorama;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{PipelineConfig, SegmentationMethod};
pub use core_modules::aggregator::{AreaPolicy, green_percent};
pub use core_modules::classifier::{AdaptiveThreshold, classify, clamp_threshold};
pub use core_modules::graythresh::graythresh;
pub use core_modules::green_index::GreenIndex;
pub use core_modules::pixel::pixel::Pixel;
pub use core_modules::pixel_array::{GreenMask, IndexArray, PixelArray, Plane};
pub use core_modules::segmentation::{BlockAverageSegmenter, IdentitySegmenter, Segmenter};
pub use error::{GreenViewError, Result};
pub use panorama::{GreenView, PanoramaLedger, PanoramaReport, TileSource, measure_panorama};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{GreenViewPipeline, TileReport};
