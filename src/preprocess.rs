use image::{imageops, DynamicImage, ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::config::PipelineConfig;
use crate::errors::{Result, SegError};

/// 入力画像を推論用テンソルへ変換する前処理
///
/// Resampling and normalization are a single step: the image is resized to the
/// target resolution first and normalized second. Interpolation does not commute
/// with the rounding to 8-bit samples, so the order is fixed here rather than left
/// to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    width: u32,
    height: u32,
    mean: [f32; 3],
    scale: [f32; 3],
}

impl Normalizer {
    pub fn new(width: u32, height: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            width,
            height,
            mean,
            scale: std.map(|s| 1.0 / s),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.width, config.height, config.mean, config.std)
    }

    pub const fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Produce a `(3, height, width)` channel-major tensor of `(v - mean) / std`.
    pub fn normalize(&self, source: &DynamicImage) -> Result<Array3<f32>> {
        let rgba = validate_source(source)?;
        let rgb = drop_alpha(rgba);
        let resized = resize_bilinear(&rgb, self.width, self.height);

        let mut tensor = resized.as_ndarray3().mapv(f32::from);
        for (k, mut channel) in tensor.outer_iter_mut().enumerate() {
            let (mean, scale) = (self.mean[k], self.scale[k]);
            channel.mapv_inplace(|v| (v - mean) * scale);
        }
        Ok(tensor)
    }
}

/// Shorthand for a one-off [`Normalizer`].
pub fn normalize(
    source: &DynamicImage,
    width: u32,
    height: u32,
    mean: [f32; 3],
    std: [f32; 3],
) -> Result<Array3<f32>> {
    Normalizer::new(width, height, mean, std).normalize(source)
}

/// Accept only 8-bit RGBA images with a non-zero size.
pub fn validate_source(source: &DynamicImage) -> Result<&RgbaImage> {
    let DynamicImage::ImageRgba8(rgba) = source else {
        return Err(SegError::invalid_input(
            "pixel format",
            format!("{:?} is not supported, expected Rgba8", source.color()),
        ));
    };
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(SegError::invalid_input(
            "image",
            format!("has zero size ({}x{})", rgba.width(), rgba.height()),
        ));
    }
    Ok(rgba)
}

/// Two-tap bilinear resampling with half-pixel centres.
///
/// Every output pixel reads at most the 2x2 source neighbourhood around
/// `(x + 0.5) * scale - 0.5`, clamped to the image, whatever the scale factor.
/// The source must be non-empty.
pub fn resize_bilinear(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_width, src_height) = image.dimensions();
    if (src_width, src_height) == (width, height) {
        return image.clone();
    }
    let scale_x = src_width as f32 / width as f32;
    let scale_y = src_height as f32 / height as f32;

    ImageBuffer::from_fn(width, height, |x, y| {
        let sx = source_coordinate(x, scale_x, src_width);
        let sy = source_coordinate(y, scale_y, src_height);
        imageops::interpolate_bilinear(image, sx, sy).unwrap_or(Rgb([0, 0, 0]))
    })
}

fn source_coordinate(dst: u32, scale: f32, src_len: u32) -> f32 {
    let max = src_len.saturating_sub(1) as f32;
    ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, max)
}

fn drop_alpha(image: &RgbaImage) -> RgbImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, _]) = *image.get_pixel(x, y);
        Rgb([r, g, b])
    })
}
