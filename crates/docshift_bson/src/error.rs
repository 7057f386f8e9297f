//! Error types for the value model.

use thiserror::Error;

/// Result type for value-model operations.
pub type BsonResult<T> = Result<T, BsonError>;

/// Errors that can occur while building or converting values.
#[derive(Debug, Error)]
pub enum BsonError {
    /// A string could not be parsed as an object identifier.
    #[error("invalid object id: {value}")]
    InvalidObjectId {
        /// The rejected input.
        value: String,
    },

    /// A string could not be parsed as a date.
    #[error("invalid date: {value}")]
    InvalidDate {
        /// The rejected input.
        value: String,
    },

    /// A JSON value could not be mapped onto the value model.
    #[error("invalid JSON value: {message}")]
    InvalidJson {
        /// Description of the mismatch.
        message: String,
    },
}

impl BsonError {
    /// Creates an invalid object id error.
    pub fn invalid_object_id(value: impl Into<String>) -> Self {
        Self::InvalidObjectId {
            value: value.into(),
        }
    }

    /// Creates an invalid date error.
    pub fn invalid_date(value: impl Into<String>) -> Self {
        Self::InvalidDate {
            value: value.into(),
        }
    }

    /// Creates an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }
}
