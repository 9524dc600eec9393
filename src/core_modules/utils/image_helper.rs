// Disk I/O for tiles. Decoding goes through the `image` crate; every format it
// understands is accepted and converted to 8-bit RGB before classification.

pub mod image_helper {
    use crate::core_modules::pixel_array::PixelArray;
    use crate::error::{GreenViewError, Result};
    use image::ImageEncoder;
    use std::path::Path;

    /// Decodes an image file into a byte-range pixel array.
    pub fn load(path: &Path) -> Result<PixelArray> {
        let image = image::open(path).map_err(|e| {
            GreenViewError::image_load(format!("cannot decode {}", path.display()), e)
        })?;
        PixelArray::from_rgb_image(&image.to_rgb8())
    }

    /// Writes a pixel array as an 8-bit RGB PNG.
    ///
    /// Normalized arrays are scaled by 255; byte arrays are written as-is.
    pub fn save(path: &Path, pixels: &PixelArray) -> Result<()> {
        let (_, max) = pixels.channel_range();
        let scale = if max <= 1.0 { 255.0 } else { 1.0 };
        let buffer: Vec<u8> = pixels
            .iter()
            .flat_map(|p| [p.red, p.green, p.blue])
            .map(|c| (c * scale).round().clamp(0.0, 255.0) as u8)
            .collect();

        let output = std::fs::File::create(path).map_err(|e| {
            GreenViewError::image_load(format!("cannot create {}", path.display()), e)
        })?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder
            .write_image(
                &buffer,
                pixels.width() as u32,
                pixels.height() as u32,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| GreenViewError::image_load(format!("cannot encode {}", path.display()), e))
    }
}
