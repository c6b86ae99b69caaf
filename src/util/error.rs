//! Error types for subsetdic.

use thiserror::Error;

/// Result alias for subsetdic operations.
pub type DicResult<T> = std::result::Result<T, DicError>;

/// Errors that can occur while setting up or running a correlation.
///
/// Per-subset failures during a frame are never reported through this type;
/// they become [`crate::StatusFlag`] values. A `DicError` returned from a
/// setup call means the run cannot start.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DicError {
    /// Image or subset dimensions are zero or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// Backing buffer is shorter than the view requires.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A parameter name that is not in the registry.
    #[error("unknown correlation parameter: {name}")]
    UnknownParameter { name: String },
    /// A parameter value whose type does not match the registry entry.
    #[error("parameter {name} expects a {expected} value, got {got}")]
    ParameterType {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
    /// A parameter value that has the right type but is not allowed.
    #[error("invalid value for {name}: {value}")]
    InvalidParameterValue { name: String, value: String },
    /// Configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A field spec was used before it was registered, or with the wrong type.
    #[error("unknown field: {name}")]
    UnknownField { name: &'static str },
    /// A scalar accessor was used on a vector field or vice versa.
    #[error("field {name} is not a {expected} field")]
    FieldTypeMismatch {
        name: &'static str,
        expected: &'static str,
    },
    /// An index is out of range.
    #[error("{context} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
    /// A numeric routine could not produce a usable value.
    #[error("numerical failure: {0}")]
    NumericalFailure(&'static str),
    /// Reading or decoding an image file failed.
    #[error("image io error: {reason}")]
    ImageIo { reason: String },
}
