//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store did not acknowledge a write.
    ///
    /// Propagated to the caller as-is; this layer never retries.
    #[error("unacknowledged {operation} operation")]
    Unacknowledged {
        /// The operation that went unacknowledged.
        operation: String,
    },

    /// No database is registered under the given alias.
    #[error("unknown database alias: {alias}")]
    UnknownDatabase {
        /// The alias that failed to resolve.
        alias: String,
    },

    /// An insert carried an `_id` that already exists in the collection.
    #[error("duplicate document id: {id}")]
    DuplicateId {
        /// Hex form of the conflicting id.
        id: String,
    },

    /// An update document used an operator the store does not understand.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Description of the rejected update.
        message: String,
    },
}

impl StoreError {
    /// Creates an unacknowledged-operation error.
    pub fn unacknowledged(operation: impl Into<String>) -> Self {
        Self::Unacknowledged {
            operation: operation.into(),
        }
    }

    /// Creates an unknown-database error.
    pub fn unknown_database(alias: impl Into<String>) -> Self {
        Self::UnknownDatabase {
            alias: alias.into(),
        }
    }

    /// Creates a duplicate-id error.
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Creates an invalid-update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }
}
