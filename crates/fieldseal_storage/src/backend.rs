//! Document store trait definition.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum length of a collection name or document id.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// A document as held by the external store.
///
/// The store does not interpret field values. Encrypted fields are plain
/// JSON strings holding an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier, unique within its collection.
    pub id: String,
    /// Top-level fields of the document.
    pub fields: Map<String, Value>,
}

impl Document {
    /// Creates an empty document with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field, builder style.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a field as a string slice, if present and a string.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// One compare-and-set field write.
///
/// The write only applies if the field currently holds `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Field to replace.
    pub field: String,
    /// Value the caller read before computing `value`.
    pub expected: Value,
    /// Replacement value.
    pub value: Value,
}

impl FieldChange {
    /// Creates a string-to-string field change.
    pub fn replace(field: impl Into<String>, expected: &str, value: String) -> Self {
        Self {
            field: field.into(),
            expected: Value::String(expected.to_string()),
            value: Value::String(value),
        }
    }
}

/// One page of a collection scan.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Documents in ascending id order.
    pub documents: Vec<Document>,
    /// Cursor for the next page, `None` when the scan is complete.
    pub next: Option<String>,
}

/// The external document store consumed by the migration drivers.
///
/// # Invariants
///
/// - `scan` returns documents in ascending id order, strictly after `after`,
///   at most `limit` of them
/// - `update` applies all changes of one call atomically or none of them
/// - Implementations must be `Send + Sync` so workers can share one store
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - One JSON file per document
pub trait DocumentStore: Send + Sync {
    /// Reads one page of `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection name is invalid or the store
    /// cannot be read.
    fn scan(&self, collection: &str, after: Option<&str>, limit: usize) -> StorageResult<Page>;

    /// Reads a single document.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifiers are invalid or the store cannot
    /// be read.
    fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if the id is taken.
    fn insert(&self, collection: &str, document: Document) -> StorageResult<()>;

    /// Applies compare-and-set changes to one document atomically.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the document does not exist
    /// - [`StorageError::Conflict`] if any field no longer holds its
    ///   expected value; nothing is written in that case
    fn update(&self, collection: &str, id: &str, changes: &[FieldChange]) -> StorageResult<()>;
}

/// Checks that a collection name or id is safe to use as a file name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidIdentifier`] if the identifier is empty,
/// too long, starts with a dot, or contains characters other than ASCII
/// alphanumerics, `-`, `_` and `.`.
pub fn validate_identifier(identifier: &str) -> StorageResult<()> {
    let valid = !identifier.is_empty()
        && identifier.len() <= MAX_IDENTIFIER_LEN
        && !identifier.starts_with('.')
        && identifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(identifier.to_string()))
    }
}

/// Applies `changes` to `fields` after checking every expected value.
///
/// Shared by the store implementations so they agree on conflict semantics.
pub(crate) fn apply_changes(
    collection: &str,
    id: &str,
    fields: &mut Map<String, Value>,
    changes: &[FieldChange],
) -> StorageResult<()> {
    for change in changes {
        let current = fields.get(&change.field).unwrap_or(&Value::Null);
        if *current != change.expected {
            return Err(StorageError::conflict(collection, id, &change.field));
        }
    }

    for change in changes {
        fields.insert(change.field.clone(), change.value.clone());
    }

    Ok(())
}
