use clap::Parser;
use image::{ImageFormat, Rgb};
use std::path::PathBuf;

use crate::errors::{Result, SegError};
use crate::palette::MAX_PALETTE_SIZE;

/// ImageNet mean in 8-bit pixel units (R, G, B).
pub const IMAGENET_MEAN: [f32; 3] = [0.485 * 255.0, 0.456 * 255.0, 0.406 * 255.0];
/// ImageNet standard deviation in 8-bit pixel units (R, G, B).
pub const IMAGENET_STD: [f32; 3] = [0.229 * 255.0, 0.224 * 255.0, 0.225 * 255.0];
pub const VOC_NUM_CLASSES: usize = 21;
pub const DEEPLAB_INPUT_SIZE: u32 = 513;

/// パイプラインの定数群
///
/// Everything the core needs from the outside world; nothing in the pipeline
/// hardcodes these values.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub width: u32,
    pub height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub num_classes: usize,
    pub fallback_color: Rgb<u8>,
    /// Fail the invocation instead of painting the fallback color.
    pub strict_labels: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: DEEPLAB_INPUT_SIZE,
            height: DEEPLAB_INPUT_SIZE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            num_classes: VOC_NUM_CLASSES,
            fallback_color: Rgb([255, 255, 255]),
            strict_labels: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SegError::Configuration {
                message: format!(
                    "target resolution must be non-zero, got {}x{}",
                    self.width, self.height
                ),
            });
        }
        if self.num_classes == 0 || self.num_classes > MAX_PALETTE_SIZE {
            return Err(SegError::Configuration {
                message: format!(
                    "num_classes must be in 1..={}, got {}",
                    MAX_PALETTE_SIZE, self.num_classes
                ),
            });
        }
        if let Some(k) = self.std.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(SegError::Configuration {
                message: format!("std[{}] must be a positive finite value", k),
            });
        }
        if let Some(k) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(SegError::Configuration {
                message: format!("mean[{}] must be finite", k),
            });
        }
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    pub input_dir: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(short, long)]
    pub model_path: PathBuf,

    #[arg(short, long, default_value = "png", value_parser = check_format)]
    pub format: String,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Require a CUDA/TensorRT execution provider instead of falling back to CPU.
    #[arg(long, default_value_t = false)]
    pub use_gpu: bool,

    #[arg(short, long, default_value_t = 4)]
    pub num_threads: usize,

    #[arg(long, default_value = "images")]
    pub input_name: String,

    #[arg(long, default_value = "output")]
    pub output_name: String,

    #[arg(long, default_value_t = DEEPLAB_INPUT_SIZE)]
    pub image_size: u32,

    #[arg(long, default_value_t = VOC_NUM_CLASSES)]
    pub num_classes: usize,

    /// Blend the label map over the source image with this opacity (0.0 - 1.0).
    #[arg(long, value_parser = check_opacity)]
    pub overlay: Option<f32>,

    /// Scale the label map back to the source image size.
    #[arg(long, default_value_t = false)]
    pub restore_size: bool,

    #[arg(long, default_value_t = false)]
    pub strict_labels: bool,
}

impl Config {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            width: self.image_size,
            height: self.image_size,
            num_classes: self.num_classes,
            strict_labels: self.strict_labels,
            ..PipelineConfig::default()
        }
    }

    pub fn output_format(&self) -> ImageFormat {
        ImageFormat::from_extension(&self.format).unwrap_or(ImageFormat::Png)
    }
}

fn check_format(s: &str) -> std::result::Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}

fn check_opacity(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{}: {}", s, e))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("opacity must be within 0.0 - 1.0, got {}", value));
    }
    Ok(value)
}
