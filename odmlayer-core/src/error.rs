//! Error types and result types for object-document mapping operations.
//!
//! Use [`OdmResult<T>`] as the return type for fallible operations. Coercion of
//! identifier and numeric values never produces an error; see [`crate::coerce`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when mapping or persisting models.
#[derive(Error, Debug)]
pub enum OdmError {
    /// Model metadata could not be resolved, or the model declarations are inconsistent.
    ///
    /// This is never transient: the operation is aborted before anything reaches storage.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A named storage connection has not been configured.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),
    /// Serialization/deserialization error when converting between models and BSON/JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The payload is not a document or has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error raised by the underlying storage backend, passed through unmodified.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// A specialized `Result` type for ODM operations.
pub type OdmResult<T> = Result<T, OdmError>;

impl From<BsonError> for OdmError {
    fn from(err: BsonError) -> Self {
        OdmError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for OdmError {
    fn from(err: SerdeJsonError) -> Self {
        OdmError::Serialization(err.to_string())
    }
}
