pub mod colorize;
pub mod config;
pub mod decode;
pub mod errors;
pub mod mocks;
pub mod model;
pub mod palette;
pub mod pipeline;
pub mod preprocess;
pub mod recompose;
pub mod traits;

use image::{DynamicImage, ImageFormat};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};
use walkdir::WalkDir;

pub use colorize::{colorize, Colorized, Colorizer};
pub use config::{Config, PipelineConfig};
pub use decode::{decode, LabelMap};
pub use errors::{Result, SegError};
pub use mocks::MockEngine;
pub use model::{EngineOptions, OnnxEngine};
pub use palette::{generate_palette, Palette};
pub use pipeline::{Pipeline, Segmentation};
pub use preprocess::{normalize, Normalizer};
pub use recompose::SinkLayout;
pub use traits::*;

/// Counts reported by [`ImageProcessor::process_directory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub processed: usize,
    pub failed: usize,
}

/// 入力ディレクトリの画像を一括でセグメンテーションする
pub struct ImageProcessor<S: ImageSegmenter> {
    segmenter: S,
    config: Config,
}

impl<S: ImageSegmenter> ImageProcessor<S> {
    pub const fn new(segmenter: S, config: Config) -> Self {
        Self { segmenter, config }
    }

    pub fn process_directory(&self) -> Result<ProcessSummary> {
        let input_path = &self.config.input_dir;
        let output_path = &self.config.output_dir;

        if !input_path.exists() {
            return Err(SegError::FileSystem {
                path: input_path.clone(),
                operation: "ディレクトリ存在確認".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "入力ディレクトリが存在しません",
                ),
            });
        }

        fs::create_dir_all(output_path).map_err(|e| SegError::FileSystem {
            path: output_path.clone(),
            operation: "ディレクトリ作成".to_string(),
            source: e,
        })?;

        let image_files = self.collect_image_files(input_path);

        if image_files.is_empty() {
            info!(input_dir = %input_path.display(), "no images to process");
            return Ok(ProcessSummary::default());
        }

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .map_err(|e| SegError::Configuration {
                    message: e.to_string(),
                })?
                .progress_chars("#>-"),
        );

        let failed = AtomicUsize::new(0);
        image_files.par_iter().for_each(|input_file| {
            if let Err(e) = self.process_single_image(input_file, output_path) {
                failed.fetch_add(1, Ordering::Relaxed);
                warn!(file = %input_file.display(), error = %e, "failed to process image");
            }
            pb.inc(1);
        });

        pb.finish_with_message("処理完了");
        let failed = failed.into_inner();
        let summary = ProcessSummary {
            processed: image_files.len() - failed,
            failed,
        };
        info!(processed = summary.processed, failed = summary.failed, "all images processed");
        Ok(summary)
    }

    fn collect_image_files(&self, input_path: &Path) -> Vec<PathBuf> {
        let mut image_files: Vec<PathBuf> = WalkDir::new(input_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|path| path.is_file() && self.is_supported_image_format(path))
            .collect();
        image_files.sort();
        image_files
    }

    pub fn is_supported_image_format(&self, path: &Path) -> bool {
        ImageFormat::from_path(path).is_ok_and(|format| format.reading_enabled())
    }

    pub fn process_single_image(&self, input_file: &Path, output_dir: &Path) -> Result<PathBuf> {
        let source = image::open(input_file)
            .map_err(|e| SegError::ImageProcessing {
                path: input_file.display().to_string(),
                operation: "画像読み込み".to_string(),
                source: Box::new(e),
            })?
            .into_rgba8();

        let colorized = self
            .segmenter
            .segment_image(&DynamicImage::ImageRgba8(source.clone()))?
            .into_rgb8();

        let rendered = match self.config.overlay {
            Some(opacity) => {
                let (width, height) = source.dimensions();
                let resized = recompose::restore_size(&colorized, width, height);
                let blended = recompose::overlay(&source, &resized, opacity)?;
                DynamicImage::ImageRgba8(blended).into_rgb8()
            }
            None if self.config.restore_size => {
                let (width, height) = source.dimensions();
                recompose::restore_size(&colorized, width, height)
            }
            None => colorized,
        };

        let relative_path = self.get_relative_path(input_file)?;
        let output_file = output_dir
            .join(relative_path)
            .with_extension(&self.config.format);

        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent).map_err(|e| SegError::FileSystem {
                path: parent.to_path_buf(),
                operation: "出力ディレクトリ作成".to_string(),
                source: e,
            })?;
        }

        rendered
            .save_with_format(&output_file, self.config.output_format())
            .map_err(|e| SegError::ImageProcessing {
                path: output_file.display().to_string(),
                operation: "画像保存".to_string(),
                source: Box::new(e),
            })?;

        Ok(output_file)
    }

    pub fn get_relative_path(&self, input_file: &Path) -> Result<PathBuf> {
        let input_dir = &self.config.input_dir;
        input_file
            .strip_prefix(input_dir)
            .map(|p| p.to_path_buf())
            .map_err(|_| SegError::FileSystem {
                path: input_file.to_path_buf(),
                operation: "相対パス取得".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "入力ファイルが入力ディレクトリ内にありません",
                ),
            })
    }
}

impl ImageProcessor<Pipeline<OnnxEngine>> {
    pub fn with_onnx_model(config: Config) -> Result<Self> {
        let engine = OnnxEngine::new(&EngineOptions::from_config(&config))?;
        let pipeline = Pipeline::new(engine, config.pipeline_config())?;
        Ok(Self::new(pipeline, config))
    }
}
