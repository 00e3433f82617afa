//! In-memory document store for testing.

use crate::backend::{apply_changes, validate_identifier, Document, DocumentStore, FieldChange, Page};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

type Collection = BTreeMap<String, Map<String, Value>>;

/// An in-memory document store.
///
/// This store keeps every collection in a sorted map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Dry runs against a snapshot loaded from elsewhere
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across worker threads.
///
/// # Example
///
/// ```rust
/// use fieldseal_storage::{Document, DocumentStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.insert("users", Document::new("u1").with_field("name", "ada")).unwrap();
/// let page = store.scan("users", None, 10).unwrap();
/// assert_eq!(page.documents.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successful `update` calls.
    ///
    /// Useful for asserting that dry runs never write.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns true if the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Overwrites a document unconditionally.
    ///
    /// Test helper for simulating writes made by another process.
    pub fn put(&self, collection: &str, document: Document) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(document.id, document.fields);
    }
}

impl DocumentStore for InMemoryStore {
    fn scan(&self, collection: &str, after: Option<&str>, limit: usize) -> StorageResult<Page> {
        validate_identifier(collection)?;

        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Page::default());
        };

        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor.to_string()),
            None => Bound::Unbounded,
        };

        let documents: Vec<Document> = docs
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        let next = if documents.len() == limit {
            documents.last().map(|d| d.id.clone())
        } else {
            None
        };

        Ok(Page { documents, next })
    }

    fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        validate_identifier(collection)?;
        validate_identifier(id)?;

        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    fn insert(&self, collection: &str, document: Document) -> StorageResult<()> {
        validate_identifier(collection)?;
        validate_identifier(&document.id)?;

        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&document.id) {
            return Err(StorageError::AlreadyExists(format!(
                "{collection}/{}",
                document.id
            )));
        }
        docs.insert(document.id, document.fields);
        Ok(())
    }

    fn update(&self, collection: &str, id: &str, changes: &[FieldChange]) -> StorageResult<()> {
        validate_identifier(collection)?;
        validate_identifier(id)?;

        let mut collections = self.collections.write();
        let fields = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StorageError::not_found(collection, id))?;

        apply_changes(collection, id, fields, changes)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
