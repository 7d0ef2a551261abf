/*!
Common error types for register map handling and the sensor calculators.

Fatal conditions are reported through [`SharedError`]. Non-fatal conditions
(saturated encodings, ROI parity) are not errors and live in
[`crate::warning`].
*/

use thiserror::Error;

/// Common result type used throughout the shared library
pub type Result<T> = std::result::Result<T, SharedError>;

/// Comprehensive error type for all shared operations
#[derive(Error, Debug)]
pub enum SharedError {
    /// A value outside a field's bit width or outside a physical bound
    #[error("Range error: {0}")]
    Range(String),

    /// Register state that matches no valid configuration
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// The named field is not part of the register map
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader/writer errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// File format errors
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    /// Configuration plan errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SharedError {
    /// Create a new range error
    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    /// Create a new consistency error
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Create a new unknown field error
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField(name.into())
    }

    /// Create a new invalid file format error
    pub fn invalid_file_format(msg: impl Into<String>) -> Self {
        Self::InvalidFileFormat(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors raised by a value outside its allowed range
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }

    /// True for errors raised by inconsistent register state
    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::Consistency(_) | Self::UnknownField(_))
    }
}
