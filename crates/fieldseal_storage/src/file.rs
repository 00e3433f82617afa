//! File-based document store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK                # Advisory lock for single-writer
//! └─ <collection>/
//!    ├─ <id>.json        # One document per file: the `fields` object
//!    └─ <id>.json.tmp    # Transient, renamed over <id>.json on update
//! ```
//!
//! Updates are written to a temporary file and renamed into place, so a
//! reader never observes a half-written document.

use crate::backend::{apply_changes, validate_identifier, Document, DocumentStore, FieldChange, Page};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const DOC_EXT: &str = "json";
const TEMP_SUFFIX: &str = ".json.tmp";

/// A document store backed by a directory tree of JSON files.
///
/// # Thread Safety
///
/// The store is `Send + Sync`. Updates take an internal write lock so the
/// read-check-rename sequence of one update never interleaves with another.
/// Across processes, the `LOCK` file is held exclusively for the lifetime of
/// the store.
///
/// # Example
///
/// ```no_run
/// use fieldseal_storage::{DocumentStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("data"), true).unwrap();
/// let page = store.scan("users", None, 100).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    guard: RwLock<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens a store rooted at `root`, taking the exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns [`StorageError::Locked`])
    /// - I/O errors occur
    pub fn open(root: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !root.exists() {
            if create_if_missing {
                fs::create_dir_all(root)?;
            } else {
                return Err(StorageError::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("store directory does not exist: {}", root.display()),
                )));
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            root: root.to_path_buf(),
            guard: RwLock::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    fn doc_path(&self, collection: &str, id: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{id}.{DOC_EXT}"))
    }

    fn read_fields(&self, path: &Path) -> StorageResult<Option<Map<String, Value>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_fields(&self, path: &Path, fields: &Map<String, Value>) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(fields)?;
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        {
            let mut file = File::create(&temp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp, path)?;
        Ok(())
    }

    /// Lists document ids of a collection strictly after `after`, sorted.
    fn list_ids(&self, collection: &str, after: Option<&str>) -> StorageResult<Vec<String>> {
        let dir = self.collection_dir(collection);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let Some(id) = name.strip_suffix(".json") else {
                continue;
            };
            if after.map_or(true, |cursor| id > cursor) {
                ids.push(id.to_string());
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

impl DocumentStore for FileStore {
    fn scan(&self, collection: &str, after: Option<&str>, limit: usize) -> StorageResult<Page> {
        validate_identifier(collection)?;
        let _guard = self.guard.read();

        let mut ids = self.list_ids(collection, after)?;
        ids.truncate(limit);
        // The cursor follows the listing, not the documents that survived it.
        let next = if ids.len() == limit {
            ids.last().cloned()
        } else {
            None
        };

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            // Skip documents removed between listing and reading.
            if let Some(fields) = self.read_fields(&self.doc_path(collection, &id))? {
                documents.push(Document { id, fields });
            }
        }

        Ok(Page { documents, next })
    }

    fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        validate_identifier(collection)?;
        validate_identifier(id)?;
        let _guard = self.guard.read();

        Ok(self
            .read_fields(&self.doc_path(collection, id))?
            .map(|fields| Document {
                id: id.to_string(),
                fields,
            }))
    }

    fn insert(&self, collection: &str, document: Document) -> StorageResult<()> {
        validate_identifier(collection)?;
        validate_identifier(&document.id)?;
        let _guard = self.guard.write();

        fs::create_dir_all(self.collection_dir(collection))?;
        let path = self.doc_path(collection, &document.id);
        if path.exists() {
            return Err(StorageError::AlreadyExists(format!(
                "{collection}/{}",
                document.id
            )));
        }
        self.write_fields(&path, &document.fields)
    }

    fn update(&self, collection: &str, id: &str, changes: &[FieldChange]) -> StorageResult<()> {
        validate_identifier(collection)?;
        validate_identifier(id)?;
        let _guard = self.guard.write();

        let path = self.doc_path(collection, id);
        let mut fields = self
            .read_fields(&path)?
            .ok_or_else(|| StorageError::not_found(collection, id))?;

        apply_changes(collection, id, &mut fields, changes)?;
        self.write_fields(&path, &fields)
    }
}
