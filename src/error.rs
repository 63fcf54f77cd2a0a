//! Error Types
//!
//! Recoverable failures (file I/O, malformed model files, bad configuration,
//! wrongly sized inference images) are reported through [`VitError`].
//!
//! Tensor shape violations inside the math are not errors in this sense:
//! they indicate a programming mistake and panic with a `ShapeMismatch`
//! message instead.

use std::fmt;
use std::io;

/// Errors produced by model I/O, dataset loading, configuration and inference
#[derive(Debug)]
pub enum VitError {
    /// A file could not be opened, read or written
    Io(io::Error),

    /// The model file is malformed (missing header, bad key, unparsable or
    /// truncated tensor data)
    Format { message: String },

    /// A tensor block carries a different name than the one expected at its
    /// position. The load is aborted.
    TensorNameMismatch { expected: String, found: String },

    /// A tensor block declares a shape that disagrees with the header's
    /// hyperparameters
    TensorShapeMismatch {
        name: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Inference input is not `expected × expected`
    ImageShape {
        expected: usize,
        rows: usize,
        cols: usize,
    },

    /// Hyperparameters that cannot build or train a model
    InvalidConfig(String),
}

impl VitError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        VitError::Format {
            message: message.into(),
        }
    }
}

impl fmt::Display for VitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VitError::Io(e) => write!(f, "I/O error: {e}"),
            VitError::Format { message } => write!(f, "malformed model file: {message}"),
            VitError::TensorNameMismatch { expected, found } => {
                write!(f, "tensor name mismatch: expected '{expected}', found '{found}'")
            }
            VitError::TensorShapeMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "tensor '{name}' has shape [{}, {}], expected [{}, {}]",
                found.0, found.1, expected.0, expected.1
            ),
            VitError::ImageShape {
                expected,
                rows,
                cols,
            } => write!(
                f,
                "image must be {expected}x{expected}, got {rows}x{cols}"
            ),
            VitError::InvalidConfig(m) => write!(f, "invalid configuration: {m}"),
        }
    }
}

impl std::error::Error for VitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VitError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VitError {
    fn from(e: io::Error) -> Self {
        VitError::Io(e)
    }
}

impl From<serde_json::Error> for VitError {
    fn from(e: serde_json::Error) -> Self {
        VitError::InvalidConfig(e.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, VitError>;
