use std::{path::PathBuf, time::Instant};

use ndarray::prelude::*;
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    config::{Config, DEEPLAB_INPUT_SIZE},
    errors::{Result, SegError},
    traits::InferenceEngine,
};

/// Options for loading an ONNX segmentation network.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub model_path: PathBuf,
    pub device_id: i32,
    /// Fail to load instead of silently running on the CPU.
    pub use_gpu: bool,
    pub num_threads: usize,
    pub input_name: String,
    pub output_name: String,
    /// Spatial size of the warm-up tensor.
    pub warmup_size: (u32, u32),
}

impl EngineOptions {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            device_id: 0,
            use_gpu: false,
            num_threads: 4,
            input_name: "images".to_string(),
            output_name: "output".to_string(),
            warmup_size: (DEEPLAB_INPUT_SIZE, DEEPLAB_INPUT_SIZE),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            model_path: config.model_path.clone(),
            device_id: config.device_id,
            use_gpu: config.use_gpu,
            num_threads: config.num_threads,
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
            warmup_size: (config.image_size, config.image_size),
        }
    }
}

/// ONNX Runtime によるセグメンテーションネットワーク
///
/// The session is behind a mutex, so one engine can be shared by many workers;
/// calls into the network are serialized.
pub struct OnnxEngine {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxEngine {
    pub fn new(options: &EngineOptions) -> Result<Self> {
        let started = Instant::now();
        let cuda = CUDAExecutionProvider::default().with_device_id(options.device_id);
        let tensorrt = TensorRTExecutionProvider::default().with_device_id(options.device_id);

        if options.use_gpu {
            let available = cuda
                .is_available()
                .map_err(|e| SegError::engine("CUDA実行プロバイダー確認", e))?;
            if !available {
                return Err(SegError::Engine {
                    operation: "GPU実行プロバイダー選択".to_string(),
                    source: "GPU inference requested but no CUDA execution provider is available"
                        .into(),
                });
            }
        }

        let providers = if options.use_gpu {
            vec![
                tensorrt.build(),
                cuda.build().error_on_failure(),
            ]
        } else {
            vec![tensorrt.build(), cuda.build()]
        };

        let mut session = SessionBuilder::new()
            .map_err(|e| SegError::engine("セッションビルダー初期化", e))?
            .with_intra_threads(options.num_threads.max(1))
            .map_err(|e| SegError::engine("スレッド数設定", e))?
            .with_execution_providers(providers)
            .map_err(|e| SegError::engine("実行プロバイダー設定", e))?
            .with_memory_pattern(true)
            .map_err(|e| SegError::engine("メモリパターン設定", e))?
            .commit_from_file(&options.model_path)
            .map_err(|e| {
                SegError::engine(
                    format!("モデルファイル読み込み: {}", options.model_path.display()),
                    e,
                )
            })?;

        check_io_name(
            "input",
            &options.input_name,
            session.inputs.iter().map(|i| i.name.as_str()),
        )?;
        check_io_name(
            "output",
            &options.output_name,
            session.outputs.iter().map(|o| o.name.as_str()),
        )?;

        // initialize model
        let (width, height) = options.warmup_size;
        let data = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        session
            .run(ort::inputs![
                options.input_name.as_str() => TensorRef::from_array_view(&data)
                    .map_err(|e| SegError::engine("初期化テンソル作成", e))?
            ])
            .map_err(|e| SegError::engine("モデル初期化実行", e))?;

        info!(
            model = %options.model_path.display(),
            use_gpu = options.use_gpu,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name: options.input_name.clone(),
            output_name: options.output_name.clone(),
        })
    }
}

impl InferenceEngine for OnnxEngine {
    fn run(&self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        let batched = input.insert_axis(Axis(0));
        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(&batched.as_standard_layout())
                    .map_err(|e| SegError::engine("入力テンソル作成", e))?
            ])
            .map_err(|e| SegError::engine("推論実行", e))?;

        let scores = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| SegError::engine("出力テンソル取得", e))?;
        debug!(shape = ?scores.shape(), "engine output");

        into_scores(scores.view())
    }
}

/// Strip the batch axis from an NCHW output; CHW outputs pass through.
fn into_scores(scores: ArrayViewD<f32>) -> Result<Array3<f32>> {
    match scores.ndim() {
        3 => Ok(scores.into_dimensionality::<Ix3>()?.to_owned()),
        4 => {
            let scores = scores.into_dimensionality::<Ix4>()?;
            let batch = scores.len_of(Axis(0));
            if batch != 1 {
                return Err(SegError::Invariant {
                    message: format!("engine returned batch size {} for a single image", batch),
                });
            }
            Ok(scores.index_axis_move(Axis(0), 0).to_owned())
        }
        n => Err(SegError::Invariant {
            message: format!("engine returned a {}-dimensional score tensor", n),
        }),
    }
}

fn check_io_name<'a>(
    kind: &str,
    expected: &str,
    mut available: impl Iterator<Item = &'a str>,
) -> Result<()> {
    if available.any(|name| name == expected) {
        return Ok(());
    }
    Err(SegError::Configuration {
        message: format!("model has no {} tensor named `{}`", kind, expected),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_io_name() {
        assert!(check_io_name("input", "images", ["images", "mask"].into_iter()).is_ok());
        let err = check_io_name("output", "output", ["mask"].into_iter()).unwrap_err();
        assert!(matches!(err, SegError::Configuration { .. }));
    }

    #[test]
    fn test_missing_model_is_engine_error() {
        let options = EngineOptions::new("does/not/exist.onnx");
        match OnnxEngine::new(&options) {
            Err(err) => {
                assert!(err.is_engine());
                let source = std::error::Error::source(&err).expect("engine error keeps its cause");
                assert!(source.is::<ort::Error>(), "cause was flattened: {source:?}");
            }
            Ok(_) => panic!("loading a missing model must fail"),
        }
    }

    #[test]
    fn test_scores_without_batch_axis() -> Result<()> {
        let raw = Array3::from_shape_fn((2, 3, 4), |(k, y, x)| (k * 100 + y * 10 + x) as f32);
        let scores = into_scores(raw.view().into_dyn())?;
        assert_eq!(scores, raw);
        Ok(())
    }

    #[test]
    fn test_scores_single_batch_is_squeezed() -> Result<()> {
        let raw = Array4::from_shape_fn((1, 21, 2, 3), |(_, k, y, x)| (k + y + x) as f32);
        let scores = into_scores(raw.view().into_dyn())?;
        assert_eq!(scores.shape(), &[21, 2, 3]);
        assert_eq!(scores, raw.index_axis(Axis(0), 0));
        Ok(())
    }

    #[test]
    fn test_scores_rejects_multi_batch() {
        let raw = Array4::<f32>::zeros((2, 3, 2, 2));
        let err = into_scores(raw.view().into_dyn()).unwrap_err();
        assert!(err.is_invariant());
    }

    #[test]
    fn test_scores_rejects_wrong_rank() {
        let raw = Array2::<f32>::zeros((4, 4));
        assert!(into_scores(raw.view().into_dyn()).unwrap_err().is_invariant());
    }

    #[test]
    fn test_options_defaults() {
        let options = EngineOptions::new("deeplabv3plus.onnx");
        assert_eq!(options.input_name, "images");
        assert_eq!(options.output_name, "output");
        assert_eq!(options.warmup_size, (513, 513));
        assert!(!options.use_gpu);
    }
}
