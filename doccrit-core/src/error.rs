//! Error types and result types for criteria construction and store operations.
//!
//! Two layers of errors exist:
//!
//! - [`CriteriaError`] is produced while rendering criteria, queries and updates into
//!   filter documents. Builders never fail eagerly; misuse is collected and reported
//!   when the structure is rendered.
//! - [`OperationsError`] is produced by [`MongoOperations`](crate::operations::MongoOperations)
//!   implementations and by the typed extension methods layered on top of them.
//!
//! Use [`CriteriaResult<T>`] and [`OperationsResult<T>`] as return types.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Errors raised when a criteria, query, update or pipeline cannot be rendered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CriteriaError {
    /// The builder was used in a way that cannot produce a valid filter document,
    /// e.g. the same field twice in one chain or `not()` followed by `eq`.
    #[error("Invalid API usage: {0}")]
    InvalidApiUsage(String),
    /// A value handed to the builder could not be converted to BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for rendering criteria and related builders.
pub type CriteriaResult<T> = Result<T, CriteriaError>;

/// Represents all possible errors that can occur when talking to a document store
/// through [`MongoOperations`](crate::operations::MongoOperations).
#[derive(Error, Debug)]
pub enum OperationsError {
    /// The criteria, query, update or pipeline handed to the operation is malformed.
    #[error(transparent)]
    Criteria(#[from] CriteriaError),
    /// Serialization/deserialization error when converting between entities and documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// A document with the given `_id` already exists in the collection.
    #[error("Duplicate key {0} in collection {1}")]
    DuplicateKey(String, String),
    /// A query expected to match at most one document matched several.
    #[error("Expected at most one result but found {0}")]
    IncorrectResultSize(usize),
    /// The operation or one of its operators is not supported by this backend.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for store operations.
pub type OperationsResult<T> = Result<T, OperationsError>;

impl From<BsonError> for CriteriaError {
    fn from(err: BsonError) -> Self {
        CriteriaError::Serialization(err.to_string())
    }
}

impl From<BsonError> for OperationsError {
    fn from(err: BsonError) -> Self {
        OperationsError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for OperationsError {
    fn from(err: SerdeJsonError) -> Self {
        OperationsError::Serialization(err.to_string())
    }
}
