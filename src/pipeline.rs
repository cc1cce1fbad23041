use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use image::{DynamicImage, RgbImage};
use ndarray::prelude::*;
use tracing::{debug, warn};

use crate::{
    colorize::{Colorized, Colorizer},
    config::PipelineConfig,
    decode::{decode, LabelMap},
    errors::{Result, SegError},
    palette::Palette,
    preprocess::{validate_source, Normalizer},
    traits::{ImageSegmenter, InferenceEngine},
};

/// Output of one pipeline invocation.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub labels: LabelMap,
    pub colorized: RgbImage,
    /// Pixels painted with the fallback color.
    pub fallback_pixels: usize,
    /// Dimensions of the image that was segmented.
    pub source_size: (u32, u32),
}

/// セグメンテーションパイプラインのコンテキスト
///
/// Owns the engine, the constants and the palette for one pipeline. Nothing is
/// global: any number of pipelines can coexist, and a palette can be shared
/// between them with [`Pipeline::with_palette`]. One invocation is a blocking
/// normalize → infer → decode → colorize sequence.
pub struct Pipeline<E: InferenceEngine> {
    config: PipelineConfig,
    normalizer: Normalizer,
    colorizer: Colorizer,
    engine: E,
    invariant_violations: AtomicU64,
}

impl<E: InferenceEngine> Pipeline<E> {
    pub fn new(engine: E, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let palette = Arc::new(Palette::new(config.num_classes));
        Self::with_palette(engine, config, palette)
    }

    pub fn with_palette(engine: E, config: PipelineConfig, palette: Arc<Palette>) -> Result<Self> {
        config.validate()?;
        if palette.len() != config.num_classes {
            return Err(SegError::Configuration {
                message: format!(
                    "palette has {} colors but num_classes is {}",
                    palette.len(),
                    config.num_classes
                ),
            });
        }
        Ok(Self {
            normalizer: Normalizer::from_config(&config),
            colorizer: Colorizer::new(palette, config.fallback_color),
            engine,
            config,
            invariant_violations: AtomicU64::new(0),
        })
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub const fn engine(&self) -> &E {
        &self.engine
    }

    pub fn palette(&self) -> &Palette {
        self.colorizer.palette()
    }

    /// Total number of pixels that reached the fallback path since construction.
    pub fn invariant_violations(&self) -> u64 {
        self.invariant_violations.load(Ordering::Relaxed)
    }

    /// Resize and normalize a source image into the network input tensor.
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Array3<f32>> {
        self.normalizer.normalize(image)
    }

    /// Decode class scores and colorize the resulting labels.
    pub fn postprocess(&self, scores: ArrayView3<f32>) -> Result<(LabelMap, Colorized)> {
        let channels = scores.len_of(Axis(0));
        if channels != self.config.num_classes {
            warn!(
                channels,
                num_classes = self.config.num_classes,
                "score tensor channel count differs from the configured class count"
            );
        }

        let labels = decode(scores)?;
        let colorized = self.colorizer.colorize(labels.view());

        if !colorized.is_clean() {
            self.invariant_violations
                .fetch_add(colorized.fallback_pixels as u64, Ordering::Relaxed);
            if self.config.strict_labels {
                return Err(SegError::Invariant {
                    message: format!(
                        "{} pixels decoded to labels outside the {}-color palette",
                        colorized.fallback_pixels,
                        self.palette().len()
                    ),
                });
            }
        }
        Ok((labels, colorized))
    }

    pub fn run(&self, image: &DynamicImage) -> Result<Segmentation> {
        let started = Instant::now();
        let source = validate_source(image)?;
        let source_size = source.dimensions();

        let input = self.preprocess(image)?;
        debug!(shape = ?input.shape(), "input tensor");

        let scores = self.engine.run(input.view())?;
        debug!(shape = ?scores.shape(), "score tensor");

        let (labels, colorized) = self.postprocess(scores.view())?;
        debug!(
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "segmentation finished"
        );

        Ok(Segmentation {
            labels,
            colorized: colorized.image,
            fallback_pixels: colorized.fallback_pixels,
            source_size,
        })
    }
}

impl<E: InferenceEngine> ImageSegmenter for Pipeline<E> {
    fn segment_image(&self, img: &DynamicImage) -> Result<DynamicImage> {
        Ok(DynamicImage::ImageRgb8(self.run(img)?.colorized))
    }

    fn input_size(&self) -> (u32, u32) {
        self.normalizer.target_size()
    }
}
