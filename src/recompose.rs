use image::{imageops, imageops::FilterType, ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};

use crate::errors::{Result, SegError};

/// Byte layout expected by an output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkLayout {
    Rgb,
    Bgr,
    /// RGBA with opaque alpha, the layout of an RGBA_8888 bitmap.
    Rgba,
    Bgra,
}

impl SinkLayout {
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }
}

/// Interleave a colorized map into the sink's byte layout, row-major.
pub fn recompose(image: &RgbImage, layout: SinkLayout) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(image.as_raw().len() / 3 * layout.channels());
    for &Rgb([r, g, b]) in image.pixels() {
        match layout {
            SinkLayout::Rgb => bytes.extend_from_slice(&[r, g, b]),
            SinkLayout::Bgr => bytes.extend_from_slice(&[b, g, r]),
            SinkLayout::Rgba => bytes.extend_from_slice(&[r, g, b, u8::MAX]),
            SinkLayout::Bgra => bytes.extend_from_slice(&[b, g, r, u8::MAX]),
        }
    }
    bytes
}

/// Opaque RGBA copy of the colorized map.
pub fn to_rgba(image: &RgbImage) -> RgbaImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Rgba([r, g, b, u8::MAX])
    })
}

/// Overwrite an existing RGBA buffer with the colorized map.
///
/// The colorized map must already have the target's dimensions.
pub fn write_into(image: &RgbImage, target: &mut RgbaImage) -> Result<()> {
    if image.dimensions() != target.dimensions() {
        return Err(SegError::Invariant {
            message: format!(
                "colorized map is {}x{} but the output buffer is {}x{}",
                image.width(),
                image.height(),
                target.width(),
                target.height()
            ),
        });
    }
    for (dst, &Rgb([r, g, b])) in target.pixels_mut().zip(image.pixels()) {
        *dst = Rgba([r, g, b, u8::MAX]);
    }
    Ok(())
}

/// Scale the colorized map to `(width, height)` without mixing neighbouring labels.
pub fn restore_size(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Nearest)
}

/// Alpha-blend the colorized map over the source image.
pub fn overlay(source: &RgbaImage, colorized: &RgbImage, opacity: f32) -> Result<RgbaImage> {
    if source.dimensions() != colorized.dimensions() {
        return Err(SegError::Invariant {
            message: format!(
                "overlay needs matching sizes: source {}x{}, map {}x{}",
                source.width(),
                source.height(),
                colorized.width(),
                colorized.height()
            ),
        });
    }
    let opacity = opacity.clamp(0.0, 1.0);
    let mix = |s: u8, m: u8| (f32::from(s) * (1.0 - opacity) + f32::from(m) * opacity).round() as u8;

    Ok(ImageBuffer::from_fn(source.width(), source.height(), |x, y| {
        let Rgba([sr, sg, sb, _]) = *source.get_pixel(x, y);
        let Rgb([mr, mg, mb]) = *colorized.get_pixel(x, y);
        Rgba([mix(sr, mr), mix(sg, mg), mix(sb, mb), u8::MAX])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pixels() -> RgbImage {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([1, 2, 3]));
        image.put_pixel(1, 0, Rgb([4, 5, 6]));
        image
    }

    #[test]
    fn test_recompose_layouts() {
        let image = two_pixels();
        assert_eq!(recompose(&image, SinkLayout::Rgb), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(recompose(&image, SinkLayout::Bgr), vec![3, 2, 1, 6, 5, 4]);
        assert_eq!(
            recompose(&image, SinkLayout::Rgba),
            vec![1, 2, 3, 255, 4, 5, 6, 255]
        );
        assert_eq!(
            recompose(&image, SinkLayout::Bgra),
            vec![3, 2, 1, 255, 6, 5, 4, 255]
        );
    }

    #[test]
    fn test_write_into_existing_buffer() -> Result<()> {
        let image = two_pixels();
        let mut target = RgbaImage::from_pixel(2, 1, Rgba([9, 9, 9, 0]));
        write_into(&image, &mut target)?;
        assert_eq!(target, to_rgba(&image));

        let mut wrong = RgbaImage::new(3, 1);
        assert!(write_into(&image, &mut wrong).unwrap_err().is_invariant());
        Ok(())
    }

    #[test]
    fn test_restore_size_keeps_palette_colors() {
        let image = two_pixels();
        let restored = restore_size(&image, 8, 3);
        assert_eq!(restored.dimensions(), (8, 3));
        assert!(restored
            .pixels()
            .all(|p| *p == Rgb([1, 2, 3]) || *p == Rgb([4, 5, 6])));
    }

    #[test]
    fn test_overlay() -> Result<()> {
        let source = RgbaImage::from_pixel(2, 1, Rgba([0, 100, 200, 255]));
        let colorized = RgbImage::from_pixel(2, 1, Rgb([200, 100, 0]));

        let half = overlay(&source, &colorized, 0.5)?;
        assert_eq!(*half.get_pixel(0, 0), Rgba([100, 100, 100, 255]));

        let full = overlay(&source, &colorized, 1.0)?;
        assert_eq!(*full.get_pixel(1, 0), Rgba([200, 100, 0, 255]));

        let mismatched = RgbImage::new(1, 1);
        assert!(overlay(&source, &mismatched, 0.5).is_err());
        Ok(())
    }
}
