// THEORY:
// The `Chunk` module represents a spatial grouping of pixels: one region of a
// segmented tile. Its only analytical operation is `average_pixel`, the mean
// color that every member pixel is replaced with during region-average
// segmentation.
//
// Like `Pixel`, `Chunk` is a "dumb" data container. It does not know where its
// pixels came from or how the region was chosen; that belongs to whichever
// `Segmenter` built it. Sums are accumulated in `f64`.

pub mod chunk {
    use crate::core_modules::pixel::pixel::Pixel;

    /// A "dumb" data container representing one region of pixels.
    pub struct Chunk {
        /// Flat indices of the member pixels in their source array.
        pub indices: Vec<usize>,
        /// The member pixels, in the same order as `indices`.
        pub pixels: Vec<Pixel>,
    }

    impl Chunk {
        pub fn new(indices: Vec<usize>, pixels: Vec<Pixel>) -> Self {
            debug_assert_eq!(indices.len(), pixels.len());
            Self { indices, pixels }
        }

        /// Calculates the arithmetic mean color of the region.
        pub fn average_pixel(&self) -> Pixel {
            let num_pixels = self.pixels.len();
            if num_pixels == 0 {
                return Pixel::default();
            }

            let (sum_r, sum_g, sum_b) = self
                .pixels
                .iter()
                .fold((0.0f64, 0.0f64, 0.0f64), |(r, g, b), pixel| {
                    (r + pixel.red, g + pixel.green, b + pixel.blue)
                });

            let count = num_pixels as f64;
            Pixel::new(sum_r / count, sum_g / count, sum_b / count)
        }
    }
}
