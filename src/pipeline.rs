// THEORY:
// The `pipeline` module is the top-level API for classifying a single tile.
// It wires the kernel stages together in their only valid order:
//
//     raw tile -> segmented tile -> green-excess index -> adaptive threshold
//              -> vegetation mask -> green percent
//
// No stage reads ahead or mutates a predecessor's output, and nothing survives
// between calls. The pipeline itself holds only configuration and a shared
// segmenter, so one instance can classify any number of tiles, from any
// number of threads, with identical results for identical input.

use crate::config::PipelineConfig;
use crate::core_modules::aggregator::green_percent;
use crate::core_modules::classifier::{AdaptiveThreshold, classify};
use crate::core_modules::green_index::GreenIndex;
use crate::core_modules::pixel_array::{GreenMask, PixelArray};
use crate::core_modules::segmentation::{Segmenter, segmenter_for};
use crate::error::Result;
use std::sync::Arc;
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::aggregator::AreaPolicy;
pub use crate::core_modules::graythresh::ThresholdSource;

/// Everything computed for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileReport {
    /// The Otsu selection and the clamped threshold used for classification.
    pub threshold: AdaptiveThreshold,
    /// Per-pixel vegetation flags.
    pub mask: GreenMask,
    /// Number of `true` entries in `mask`.
    pub green_pixels: usize,
    /// Vegetation share of the tile, in [0,100].
    pub green_percent: f64,
}

/// Classifies tiles with a fixed configuration and segmenter.
#[derive(Clone)]
pub struct GreenViewPipeline {
    config: PipelineConfig,
    segmenter: Arc<dyn Segmenter>,
}

impl GreenViewPipeline {
    /// Builds a pipeline using the segmenter selected in `config`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let segmenter = segmenter_for(&config.segmentation);
        Ok(Self { config, segmenter })
    }

    /// Builds a pipeline around a caller-supplied segmenter.
    pub fn with_segmenter(config: PipelineConfig, segmenter: Arc<dyn Segmenter>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, segmenter })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the full kernel over one tile.
    pub fn classify_tile(&self, tile: &PixelArray) -> Result<TileReport> {
        // Stage 1: Region-average segmentation
        let segmented = self.segmenter.segment(tile)?;
        tile.ensure_same_shape(&segmented)?;

        // Stage 2: Green-excess index
        let index = GreenIndex::derive(&segmented)?;

        // Stage 3: Adaptive threshold, clamped to the operating band
        let threshold = AdaptiveThreshold::select(&index.exg, self.config.fallback_level);

        // Stage 4: Vegetation mask
        let mask = classify(&index, threshold.clamped)?;

        // Stage 5: Percentage
        let green_pixels = mask.count_green();
        let green_percent = green_percent(&mask, self.config.area_policy);

        debug!(
            width = tile.width(),
            height = tile.height(),
            segmenter = self.segmenter.name(),
            scale = ?index.scale,
            raw_threshold = threshold.selection.threshold,
            threshold_source = ?threshold.selection.source,
            threshold = threshold.clamped,
            green_pixels,
            green_percent,
            "classified tile"
        );

        Ok(TileReport {
            threshold,
            mask,
            green_pixels,
            green_percent,
        })
    }

    /// Green percent of one tile.
    pub fn green_percent(&self, tile: &PixelArray) -> Result<f64> {
        Ok(self.classify_tile(tile)?.green_percent)
    }
}
