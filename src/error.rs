//! Error types for qgemm entry points.
//!
//! Only the one-time validation done when a call starts can fail. The packing,
//! multiply and requantize loops never report errors.

use std::fmt;

/// Errors reported by the validating entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QgemmError {
    /// The caller-supplied scratch buffer cannot hold the required regions.
    ScratchTooSmall {
        /// Bytes needed for this shape, including alignment slack.
        required: usize,
        /// Bytes actually provided.
        provided: usize,
    },
    /// An operand or result slice does not match the declared shape.
    ShapeMismatch {
        /// Which buffer is wrong (`"lhs"`, `"rhs"`, `"result"`).
        operand: &'static str,
        /// Minimum number of elements the shape needs.
        expected: usize,
        /// Number of elements provided.
        actual: usize,
    },
    /// A scratch region could not be carved out with the required alignment.
    LayoutError {
        /// The size parameter that caused the error.
        size: usize,
        /// The alignment parameter that caused the error.
        alignment: usize,
        /// Human-readable error message.
        message: String,
    },
    /// Input validation error.
    ValidationError {
        /// Human-readable error message.
        message: String,
    },
}

impl fmt::Display for QgemmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QgemmError::ScratchTooSmall { required, provided } => write!(
                f,
                "Scratch buffer too small: {} bytes required, {} bytes provided",
                required, provided
            ),
            QgemmError::ShapeMismatch {
                operand,
                expected,
                actual,
            } => write!(
                f,
                "Shape mismatch for {}: expected at least {} elements, got {}",
                operand, expected, actual
            ),
            QgemmError::LayoutError {
                size,
                alignment,
                message,
            } => write!(
                f,
                "Invalid memory layout: {} (size: {}, alignment: {})",
                message, size, alignment
            ),
            QgemmError::ValidationError { message } => {
                write!(f, "Validation error: {}", message)
            }
        }
    }
}

impl std::error::Error for QgemmError {}

/// Result type alias for qgemm operations.
pub type Result<T> = std::result::Result<T, QgemmError>;

/// Creates a scratch size error.
pub fn scratch_error(required: usize, provided: usize) -> QgemmError {
    QgemmError::ScratchTooSmall { required, provided }
}

/// Creates a shape mismatch error.
pub fn shape_error(operand: &'static str, expected: usize, actual: usize) -> QgemmError {
    QgemmError::ShapeMismatch {
        operand,
        expected,
        actual,
    }
}

/// Creates a layout error.
pub fn layout_error(size: usize, alignment: usize, message: impl Into<String>) -> QgemmError {
    QgemmError::LayoutError {
        size,
        alignment,
        message: message.into(),
    }
}

/// Creates a validation error.
pub fn validation_error(message: impl Into<String>) -> QgemmError {
    QgemmError::ValidationError {
        message: message.into(),
    }
}
