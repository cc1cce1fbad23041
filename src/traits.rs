use std::sync::Arc;

use crate::errors::Result;
use image::DynamicImage;
use ndarray::prelude::*;

/// 推論エンジンの抽象化
///
/// Takes a channel-major `(3, H, W)` normalized tensor and returns the channel-major
/// `(C, H', W')` class scores. Calls block until the engine is done; failures are
/// returned as-is and never retried here.
pub trait InferenceEngine: Send + Sync {
    fn run(&self, input: ArrayView3<f32>) -> Result<Array3<f32>>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Arc<E> {
    fn run(&self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        (**self).run(input)
    }
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn run(&self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        (**self).run(input)
    }
}

/// 画像セグメンテーション処理の抽象化
///
/// The batch processor depends on this rather than on a concrete pipeline so it can
/// be driven by a test double.
pub trait ImageSegmenter: Send + Sync {
    /// Colorized label map for a source image.
    fn segment_image(&self, img: &DynamicImage) -> Result<DynamicImage>;

    /// Network input resolution `(width, height)`.
    fn input_size(&self) -> (u32, u32);
}
