//! Access error types

use thiserror::Error;

/// Errors raised by property and element access
#[derive(Debug, Error)]
pub enum AccessError {
    /// Type error (e.g., reading a property of undefined)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error (e.g., invalid array length)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal error (engine bug, not user error)
    #[error("InternalError: {0}")]
    InternalError(String),
}

impl AccessError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// True if this is a TypeError
    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::TypeError(_))
    }

    /// True if this is a RangeError
    pub fn is_range_error(&self) -> bool {
        matches!(self, Self::RangeError(_))
    }
}

/// Result type for access operations
pub type AccessResult<T> = std::result::Result<T, AccessError>;
