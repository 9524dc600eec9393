// THEORY:
// The index deriver turns a segmented tile into the per-pixel signals the
// classifier reads. Vegetation reflects more green than red or blue, so the
// green-excess index
//
//     exg = (G - R) + (G - B)
//
// is large on foliage and near zero or negative on sky, asphalt and facades.
//
// Scale detection happens here because callers may hand over either
// normalized floats or raw bytes. The rule looks at the largest channel value
// in the whole array: at most 1 means already normalized, at least 256 means
// an unknown wide range that is min-max rescaled, anything in between is a
// byte image divided by 255.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::pixel_array::{IndexArray, PixelArray, Plane};
use crate::error::Result;

/// The value range an input array was detected to be in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelScale {
    /// Maximum channel value is at most 1.
    Normalized,
    /// Maximum channel value lies in (1, 256).
    Byte,
    /// Maximum channel value is at least 256; rescaled with the array's min and max.
    Wide { min: f64, max: f64 },
}

impl ChannelScale {
    pub fn detect(image: &PixelArray) -> Self {
        let (min, max) = image.channel_range();
        if max <= 1.0 {
            ChannelScale::Normalized
        } else if max >= 256.0 {
            ChannelScale::Wide { min, max }
        } else {
            ChannelScale::Byte
        }
    }

    /// Maps one channel value into [0,1].
    pub fn normalize(&self, value: f64) -> f64 {
        match *self {
            ChannelScale::Normalized => value,
            ChannelScale::Byte => value / 255.0,
            ChannelScale::Wide { min, max } => (value - min) / (max - min),
        }
    }
}

/// Normalized channel planes plus the green-excess index of one tile.
#[derive(Debug, Clone)]
pub struct GreenIndex {
    pub red: Plane<f64>,
    pub green: Plane<f64>,
    pub blue: Plane<f64>,
    /// `(G - R) + (G - B)` per pixel.
    pub exg: IndexArray,
    /// The scale the source array was detected to be in.
    pub scale: ChannelScale,
}

impl GreenIndex {
    /// Normalizes `image` and derives the green-excess index.
    pub fn derive(image: &PixelArray) -> Result<Self> {
        let scale = ChannelScale::detect(image);
        let normalized: Plane<Pixel> = image.map(|pixel| pixel.map(|c| scale.normalize(c)));

        let red = normalized.map(|p| p.red);
        let green = normalized.map(|p| p.green);
        let blue = normalized.map(|p| p.blue);
        let exg = normalized.map(|p| {
            let green_red_diff = p.green - p.red;
            let green_blue_diff = p.green - p.blue;
            green_red_diff + green_blue_diff
        });

        Ok(Self {
            red,
            green,
            blue,
            exg,
            scale,
        })
    }

    pub fn width(&self) -> usize {
        self.exg.width()
    }

    pub fn height(&self) -> usize {
        self.exg.height()
    }

    /// Confirms that every plane shares the index's shape.
    pub fn ensure_consistent(&self) -> Result<()> {
        self.exg.ensure_same_shape(&self.red)?;
        self.exg.ensure_same_shape(&self.green)?;
        self.exg.ensure_same_shape(&self.blue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(pixel: Pixel) -> PixelArray {
        PixelArray::new(1, 1, vec![pixel]).unwrap()
    }

    #[test]
    fn test_normalized_input_is_untouched() {
        let index = GreenIndex::derive(&single(Pixel::new(0.2, 0.7, 0.1))).unwrap();
        assert_eq!(index.scale, ChannelScale::Normalized);
        assert!((index.exg.values()[0] - 1.1).abs() < 1e-12);
        assert_eq!(index.green.values()[0], 0.7);
    }

    #[test]
    fn test_byte_input_is_divided_by_255() {
        let index = GreenIndex::derive(&single(Pixel::new(51.0, 204.0, 0.0))).unwrap();
        assert_eq!(index.scale, ChannelScale::Byte);
        assert!((index.red.values()[0] - 0.2).abs() < 1e-12);
        assert!((index.green.values()[0] - 0.8).abs() < 1e-12);
        assert!((index.exg.values()[0] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_wide_input_is_min_max_rescaled() {
        let image = PixelArray::new(
            2,
            1,
            vec![Pixel::new(0.0, 1000.0, 0.0), Pixel::new(500.0, 500.0, 250.0)],
        )
        .unwrap();
        let index = GreenIndex::derive(&image).unwrap();
        assert_eq!(index.scale, ChannelScale::Wide { min: 0.0, max: 1000.0 });
        assert_eq!(index.green.values(), &[1.0, 0.5]);
        assert_eq!(index.blue.values(), &[0.0, 0.25]);
        assert_eq!(index.exg.values(), &[2.0, 0.25]);
    }

    #[test]
    fn test_grey_pixels_have_zero_excess() {
        let image = PixelArray::filled(3, 2, Pixel::new(128.0, 128.0, 128.0)).unwrap();
        let index = GreenIndex::derive(&image).unwrap();
        index.ensure_consistent().unwrap();
        assert!(index.exg.iter().all(|&v| v == 0.0));
        assert_eq!((index.width(), index.height()), (3, 2));
    }
}
