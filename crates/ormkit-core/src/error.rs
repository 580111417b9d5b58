//! Core error types.

use ormkit_lang::{CompileError, LangError, NormalizeError};
use ormkit_proto::CastError;
use thiserror::Error;

use crate::entity::Entity;

/// Result type for core operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by a storage adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    /// Network or storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A patch or delete targeted a missing record.
    #[error("{type_name} '{id}' not found")]
    NotFound { type_name: String, id: String },

    /// The backend refused a write.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The backend cannot serve this request.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<NormalizeError> for AdapterError {
    fn from(err: NormalizeError) -> Self {
        AdapterError::Unsupported(err.to_string())
    }
}

/// One failed operation of a batch.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Entity whose operation failed.
    pub entity: Entity,
    /// Error reported by the adapter for that operation.
    pub error: AdapterError,
}

/// Per-entity failures of an executed batch.
#[derive(Debug, Clone, Error)]
#[error("{} of {} batch operations failed", .failures.len(), .total)]
pub struct BatchError {
    /// Failed operations, in batch order.
    pub failures: Vec<BatchFailure>,
    /// Number of operations sent.
    pub total: usize,
}

impl BatchError {
    /// The first failure in batch order.
    pub fn first_error(&self) -> Option<&BatchFailure> {
        self.failures.first()
    }

    /// Collapse into the first failure's error.
    pub fn into_first_error(self) -> Error {
        match self.failures.into_iter().next() {
            Some(failure) => Error::Adapter(failure.error),
            None => Error::Adapter(AdapterError::Storage("empty batch failure".into())),
        }
    }
}

/// Core errors.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An attribute value could not be cast.
    #[error(transparent)]
    Cast(#[from] CastError),

    /// A filter failed to parse or compile.
    #[error(transparent)]
    Lang(#[from] LangError),

    /// A filter is too large to normalize.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// The adapter failed.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Some operations of a batch failed.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// Object type not in the schema.
    #[error("unknown object type '{0}'")]
    UnknownType(String),

    /// Relationship not defined on the type, or not usable here.
    #[error("unknown relationship '{name}' on type '{object_type}'")]
    UnknownRelationship { object_type: String, name: String },

    /// Attribute not defined on the type.
    #[error("unknown attribute '{name}' on type '{object_type}'")]
    UnknownAttribute { object_type: String, name: String },

    /// An entity of the wrong type was supplied.
    #[error("expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// The entity belongs to a store with a different adapter.
    #[error("{type_name} '{id}' belongs to a different adapter")]
    ForeignAdapter { type_name: String, id: String },

    /// The entity has been destroyed.
    #[error("{type_name} '{id}' has been destroyed")]
    Destroyed { type_name: String, id: String },

    /// An include path is nested too deeply.
    #[error("include path '{path}' exceeds maximum depth {limit}")]
    PreloadTooDeep { path: String, limit: usize },
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Error::Lang(err.into())
    }
}

impl Error {
    pub(crate) fn unknown_relationship(object_type: &str, name: &str) -> Self {
        Error::UnknownRelationship {
            object_type: object_type.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn unknown_attribute(object_type: &str, name: &str) -> Self {
        Error::UnknownAttribute {
            object_type: object_type.to_string(),
            name: name.to_string(),
        }
    }
}
