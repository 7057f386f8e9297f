//! Error types for docshift core.

use docshift_bson::BsonError;
use docshift_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Value-model error.
    #[error("value error: {0}")]
    Bson(#[from] BsonError),

    /// Store collaborator error.
    ///
    /// Includes unacknowledged writes; these are propagated as-is and
    /// never retried here.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A value did not match a field's structural type.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the mismatch.
        message: String,
    },

    /// Several fields failed validation at once.
    #[error("invalid document: {}", errors.join("; "))]
    InvalidDocument {
        /// One message per failing field.
        errors: Vec<String>,
    },

    /// A value is not a member of an enumeration's choice set.
    #[error("invalid choice: {message}")]
    InvalidChoice {
        /// Description of the rejected value.
        message: String,
    },

    /// A field or entity type declaration is malformed.
    #[error("definition error: {message}")]
    Definition {
        /// Description of the problem.
        message: String,
    },

    /// No field with the given name exists on the entity.
    #[error("unknown field: {name}")]
    UnknownField {
        /// The missing field name.
        name: String,
    },

    /// No entity type with the given name is registered.
    #[error("unknown entity type: {name}")]
    UnknownEntity {
        /// The missing type name.
        name: String,
    },

    /// The identity field would be altered or removed by a shift.
    ///
    /// Always fatal; the shift aborts before any mutation and manual
    /// intervention is required.
    #[error("identity integrity violation: {message}")]
    IdentityIntegrity {
        /// Description of the violation.
        message: String,
    },

    /// A mutation was attempted through a read-only manager.
    #[error("operation not allowed: {operation}")]
    OperationNotAllowed {
        /// The rejected operation.
        operation: String,
    },

    /// The declared schema and the stored validator already agree.
    ///
    /// A control-flow signal, not a failure; callers treat it as "skip".
    #[error("no shifting required")]
    NoShiftRequired,
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid-choice error.
    pub fn invalid_choice(message: impl Into<String>) -> Self {
        Self::InvalidChoice {
            message: message.into(),
        }
    }

    /// Creates a definition error.
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition {
            message: message.into(),
        }
    }

    /// Creates an unknown-field error.
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField { name: name.into() }
    }

    /// Creates an unknown-entity error.
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    /// Creates an identity-integrity error.
    pub fn identity_integrity(message: impl Into<String>) -> Self {
        Self::IdentityIntegrity {
            message: message.into(),
        }
    }

    /// Creates an operation-not-allowed error.
    pub fn operation_not_allowed(operation: impl Into<String>) -> Self {
        Self::OperationNotAllowed {
            operation: operation.into(),
        }
    }
}
