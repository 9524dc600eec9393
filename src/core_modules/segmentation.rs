// THEORY:
// Segmentation is the first stage of classification. It suppresses
// high-frequency noise by replacing every pixel with the mean color of the
// perceptually coherent region it belongs to, so the green-excess threshold is
// applied to regions rather than to individual noisy pixels.
//
// Key architectural principles:
// 1.  **Contract, not algorithm**: The classifier only relies on the output
//     having the input's shape and being piecewise-constant over regions. How
//     regions are formed is the segmenter's business, which is why it sits
//     behind the `Segmenter` trait and is injected into the pipeline.
// 2.  **Grid slicing**: `BlockAverageSegmenter` slices the tile into a fixed
//     grid of rectangular `Chunk`s and writes each chunk's average back over
//     its pixels. Edge chunks are allowed to be narrower or shorter than the
//     nominal block so every pixel belongs to exactly one region.
// 3.  **Statelessness**: Segmenters hold configuration only. They are `Send +
//     Sync` and shared freely between batch workers.

use crate::config::SegmentationMethod;
use crate::core_modules::chunk::chunk::Chunk;
use crate::core_modules::pixel_array::PixelArray;
use crate::error::Result;
use std::sync::Arc;

/// Replaces every pixel by the mean color of its region.
pub trait Segmenter: Send + Sync {
    /// Returns an array of identical shape, piecewise-constant over regions.
    fn segment(&self, image: &PixelArray) -> Result<PixelArray>;

    /// Short name used in log output.
    fn name(&self) -> &'static str;
}

/// Treats every pixel as its own region.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySegmenter;

impl Segmenter for IdentitySegmenter {
    fn segment(&self, image: &PixelArray) -> Result<PixelArray> {
        Ok(image.clone())
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Averages the tile over a fixed grid of rectangular blocks.
#[derive(Debug, Clone, Copy)]
pub struct BlockAverageSegmenter {
    /// The nominal width of a block in pixels.
    block_width: usize,
    /// The nominal height of a block in pixels.
    block_height: usize,
}

impl BlockAverageSegmenter {
    pub fn new(block_width: usize, block_height: usize) -> Self {
        Self {
            block_width: block_width.max(1),
            block_height: block_height.max(1),
        }
    }

    /// Splits an image into four quadrants, rounding the split point up.
    pub fn quadrants(width: usize, height: usize) -> Self {
        Self::new(width.div_ceil(2), height.div_ceil(2))
    }

    /// Slices the image into its grid of chunks, row by row.
    fn extract_chunks(&self, image: &PixelArray) -> Vec<Chunk> {
        let (width, height) = (image.width(), image.height());
        let grid_width = width.div_ceil(self.block_width);
        let grid_height = height.div_ceil(self.block_height);
        let pixels = image.values();

        let mut chunks = Vec::with_capacity(grid_width * grid_height);
        for chunk_y in 0..grid_height {
            for chunk_x in 0..grid_width {
                let start_x = chunk_x * self.block_width;
                let start_y = chunk_y * self.block_height;
                let end_x = (start_x + self.block_width).min(width);
                let end_y = (start_y + self.block_height).min(height);

                let capacity = (end_x - start_x) * (end_y - start_y);
                let mut indices = Vec::with_capacity(capacity);
                let mut members = Vec::with_capacity(capacity);
                for y in start_y..end_y {
                    for x in start_x..end_x {
                        let index = y * width + x;
                        indices.push(index);
                        members.push(pixels[index]);
                    }
                }
                chunks.push(Chunk::new(indices, members));
            }
        }
        chunks
    }
}

impl Segmenter for BlockAverageSegmenter {
    fn segment(&self, image: &PixelArray) -> Result<PixelArray> {
        let mut output = image.values().to_vec();
        for chunk in self.extract_chunks(image) {
            let average = chunk.average_pixel();
            for &index in &chunk.indices {
                output[index] = average;
            }
        }
        PixelArray::new(image.width(), image.height(), output)
    }

    fn name(&self) -> &'static str {
        "block-average"
    }
}

/// Builds the segmenter selected in configuration.
pub fn segmenter_for(method: &SegmentationMethod) -> Arc<dyn Segmenter> {
    match *method {
        SegmentationMethod::Identity => Arc::new(IdentitySegmenter),
        SegmentationMethod::BlockAverage {
            block_width,
            block_height,
        } => Arc::new(BlockAverageSegmenter::new(block_width, block_height)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::pixel::Pixel;

    fn ramp(width: usize, height: usize) -> PixelArray {
        let pixels = (0..width * height)
            .map(|i| Pixel::new(i as f64, (i * 2) as f64, 0.0))
            .collect();
        PixelArray::new(width, height, pixels).unwrap()
    }

    #[test]
    fn test_identity_preserves_input() {
        let image = ramp(3, 3);
        let segmented = IdentitySegmenter.segment(&image).unwrap();
        assert_eq!(segmented, image);
    }

    #[test]
    fn test_quadrant_averaging() {
        // 4x4 ramp: the top-left quadrant holds indices 0, 1, 4, 5.
        let image = ramp(4, 4);
        let segmented = BlockAverageSegmenter::quadrants(4, 4)
            .segment(&image)
            .unwrap();

        assert!(segmented.same_shape(&image));
        let top_left = Pixel::new(2.5, 5.0, 0.0);
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(segmented.get(x, y), Some(&top_left));
        }
        // Bottom-right quadrant: indices 10, 11, 14, 15.
        assert_eq!(segmented.get(3, 3), Some(&Pixel::new(12.5, 25.0, 0.0)));
    }

    #[test]
    fn test_partial_edge_blocks_cover_every_pixel() {
        let image = ramp(5, 3);
        let segmented = BlockAverageSegmenter::new(2, 2).segment(&image).unwrap();
        assert_eq!(segmented.len(), 15);
        // Rightmost column, bottom row: a 1x1 block keeps its own value.
        assert_eq!(segmented.get(4, 2), image.get(4, 2));
        // Rightmost column, top rows: a 1x2 block of indices 4 and 9.
        assert_eq!(segmented.get(4, 0), Some(&Pixel::new(6.5, 13.0, 0.0)));
    }

    #[test]
    fn test_segmenter_for_config() {
        let identity = segmenter_for(&SegmentationMethod::Identity);
        assert_eq!(identity.name(), "identity");
        let blocks = segmenter_for(&SegmentationMethod::BlockAverage {
            block_width: 8,
            block_height: 8,
        });
        assert_eq!(blocks.name(), "block-average");
    }
}
