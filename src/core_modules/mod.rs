// The classification kernel, leaf-first: pixels and grids, region-average
// segmentation, the green-excess index, Otsu threshold selection, the
// vegetation rules and the final percentage.

pub mod pixel;
pub mod pixel_array;
pub mod chunk;
pub mod segmentation;
pub mod green_index;
pub mod graythresh;
pub mod classifier;
pub mod aggregator;
pub mod utils;
