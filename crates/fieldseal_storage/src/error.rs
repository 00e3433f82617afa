//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored document could not be parsed or serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The addressed document does not exist.
    #[error("document not found: {collection}/{id}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// Identifier that was not found.
        id: String,
    },

    /// A compare-and-set write found a different value than expected.
    #[error("concurrent modification of {collection}/{id} field {field}")]
    Conflict {
        /// Collection of the document.
        collection: String,
        /// Identifier of the document.
        id: String,
        /// Field whose current value did not match.
        field: String,
    },

    /// An insert targeted an identifier that is already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Another process holds the store lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// A collection name, document id or secret id is not usable.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

impl StorageError {
    /// Creates a not-found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(
        collection: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            collection: collection.into(),
            id: id.into(),
            field: field.into(),
        }
    }
}
