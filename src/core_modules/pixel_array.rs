// THEORY:
// Every per-pixel quantity in a classification call lives on the same 2-D
// grid: the raw tile, its segmented copy, the green-excess index and the final
// boolean mask. `Plane<T>` is that grid. It is row-major, never empty, and its
// constructor is the single place where shapes are validated. Once a plane
// exists its length always equals `width * height`, so downstream stages can
// zip planes together without re-checking.
//
// Shape errors are reported with the offending dimensions and are never
// repaired by truncating or padding.

use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{GreenViewError, Result};

/// A dense, row-major 2-D grid of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane<T> {
    width: usize,
    height: usize,
    values: Vec<T>,
}

/// One RGB triple per pixel, in [0,1] or [0,255].
pub type PixelArray = Plane<Pixel>;
/// One green-excess value per pixel.
pub type IndexArray = Plane<f64>;
/// One vegetation flag per pixel.
pub type GreenMask = Plane<bool>;

fn expected_len(width: usize, height: usize, actual_len: usize) -> Result<usize> {
    match width.checked_mul(height) {
        Some(len) if len > 0 => Ok(len),
        _ => Err(GreenViewError::invalid_shape(width, height, actual_len)),
    }
}

impl<T> Plane<T> {
    /// Wraps `values` as a `width x height` grid.
    pub fn new(width: usize, height: usize, values: Vec<T>) -> Result<Self> {
        let len = expected_len(width, height, values.len())?;
        if values.len() != len {
            return Err(GreenViewError::invalid_shape(width, height, values.len()));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a constructed plane; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get(y * self.width + x)
    }

    pub fn same_shape<U>(&self, other: &Plane<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Fails with the other plane's dimensions when the grids differ.
    pub fn ensure_same_shape<U>(&self, other: &Plane<U>) -> Result<()> {
        if self.same_shape(other) {
            Ok(())
        } else {
            Err(GreenViewError::InvalidShape {
                expected_width: self.width,
                expected_height: self.height,
                expected_len: self.values.len(),
                actual_len: other.values.len(),
            })
        }
    }

    /// Builds a plane of identical shape by transforming every value.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Plane<U> {
        Plane {
            width: self.width,
            height: self.height,
            values: self.values.iter().map(f).collect(),
        }
    }
}

impl<T: Clone> Plane<T> {
    /// A `width x height` grid where every value is `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Result<Self> {
        let len = expected_len(width, height, 0)?;
        Self::new(width, height, vec![value; len])
    }
}

impl GreenMask {
    /// Number of pixels flagged as vegetation.
    pub fn count_green(&self) -> usize {
        self.values.iter().filter(|&&green| green).count()
    }
}

impl PixelArray {
    /// Converts a decoded 8-bit RGB image.
    pub fn from_rgb_image(image: &image::RgbImage) -> Result<Self> {
        let pixels = image.pixels().map(|&rgb| Pixel::from(rgb)).collect();
        Self::new(image.width() as usize, image.height() as usize, pixels)
    }

    /// Smallest and largest channel value across the whole array.
    pub fn channel_range(&self) -> (f64, f64) {
        self.values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), pixel| (lo.min(pixel.min_channel()), hi.max(pixel.max_channel())),
        )
    }
}
