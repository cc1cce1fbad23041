use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{Result, SegError};
use crate::traits::InferenceEngine;
use ndarray::prelude::*;

/// テスト用の推論エンジン
#[derive(Debug)]
pub struct MockEngine {
    behavior: MockBehavior,
    calls: AtomicUsize,
}

#[derive(Debug, Clone)]
enum MockBehavior {
    /// Always return this score tensor.
    Fixed(Array3<f32>),
    /// Put the maximum score on `label` everywhere, at the input resolution.
    Uniform { num_classes: usize, label: usize },
    /// Predict by horizontal position: each column band gets its own label.
    Stripes { num_classes: usize },
    Fail(String),
}

impl MockEngine {
    pub fn fixed(scores: Array3<f32>) -> Self {
        Self::with_behavior(MockBehavior::Fixed(scores))
    }

    pub fn uniform(num_classes: usize, label: usize) -> Self {
        Self::with_behavior(MockBehavior::Uniform { num_classes, label })
    }

    pub fn stripes(num_classes: usize) -> Self {
        Self::with_behavior(MockBehavior::Stripes { num_classes })
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Fail(message.into()))
    }

    const fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for MockEngine {
    fn run(&self, input: ArrayView3<f32>) -> Result<Array3<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (_, height, width) = input.dim();
        match &self.behavior {
            MockBehavior::Fixed(scores) => Ok(scores.clone()),
            MockBehavior::Uniform { num_classes, label } => {
                let label = *label;
                Ok(Array3::from_shape_fn(
                    (*num_classes, height, width),
                    |(k, _, _)| if k == label { 1.0 } else { 0.0 },
                ))
            }
            MockBehavior::Stripes { num_classes } => {
                let classes = *num_classes;
                Ok(Array3::from_shape_fn((classes, height, width), |(k, _, x)| {
                    if k == x * classes / width.max(1) {
                        1.0
                    } else {
                        -1.0
                    }
                }))
            }
            MockBehavior::Fail(message) => Err(SegError::Engine {
                operation: "mock inference".to_string(),
                source: message.clone().into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_engine_shape() -> Result<()> {
        let engine = MockEngine::uniform(21, 15);
        let input = Array3::<f32>::zeros((3, 8, 6));
        let scores = engine.run(input.view())?;
        assert_eq!(scores.dim(), (21, 8, 6));
        assert_eq!(scores[[15, 0, 0]], 1.0);
        assert_eq!(engine.calls(), 1);
        Ok(())
    }

    #[test]
    fn test_failing_engine() {
        let engine = MockEngine::failing("backend unavailable");
        let input = Array3::<f32>::zeros((3, 2, 2));
        assert!(engine.run(input.view()).unwrap_err().is_engine());
    }
}
