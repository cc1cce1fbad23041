use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the segmentation pipeline.
///
/// The first three variants are the pipeline taxonomy: bad input is rejected before
/// any processing starts, engine failures are passed through untouched, and
/// invariant violations point at a decoder/palette mismatch. The remaining variants
/// belong to the batch processor and the command line.
#[derive(Error, Debug)]
pub enum SegError {
    #[error("Invalid input: {field} {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Inference engine error: {operation} failed")]
    Engine {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Internal invariant violated: {message}")]
    Invariant { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, SegError>;

impl SegError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn engine<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Engine {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    pub const fn is_engine(&self) -> bool {
        matches!(self, Self::Engine { .. })
    }

    pub const fn is_invariant(&self) -> bool {
        matches!(self, Self::Invariant { .. })
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should construct `SegError::FileSystem`
/// directly; this conversion is the fallback for `?` on bare I/O calls.
impl From<std::io::Error> for SegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert ndarray shape errors to engine errors.
///
/// Shape errors only arise while reshaping tensors handed to or returned from the
/// engine, so they are reported as engine failures rather than a separate category.
impl From<ndarray::ShapeError> for SegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Engine {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_predicates() {
        let err = SegError::invalid_input("image", "is empty");
        assert!(err.is_invalid_input());
        assert!(!err.is_engine());
        assert_eq!(err.to_string(), "Invalid input: image is empty");

        let err = SegError::engine(
            "session run",
            std::io::Error::new(std::io::ErrorKind::Other, "backend unavailable"),
        );
        assert!(err.is_engine());
        assert!(std::error::Error::source(&err).is_some());

        let err = SegError::Invariant {
            message: "label 21 outside palette".to_string(),
        };
        assert!(err.is_invariant());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: SegError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, SegError::FileSystem { .. }));
    }

    #[test]
    fn test_shape_error_keeps_cause() {
        let shape_err = ndarray::Array::from_shape_vec((2, 2), vec![0.0f32; 3]).unwrap_err();
        let err: SegError = shape_err.into();
        assert!(err.is_engine());
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.is::<ndarray::ShapeError>());
    }
}
