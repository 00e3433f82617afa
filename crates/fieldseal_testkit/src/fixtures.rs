//! Test fixtures and store helpers.
//!
//! Provides stores seeded with legacy and current values, and store
//! wrappers that inject concurrent edits or store failures.

use fieldseal_core::crypto::{AuthenticatedCipher, KdfParams, LegacyCipher, MIN_ITERATIONS};
use fieldseal_core::{Config, KeyProvider, Secret};
use fieldseal_storage::{
    Document, DocumentStore, FieldChange, FileSecretStore, FileStore, InMemorySecretStore,
    InMemoryStore, Page, StorageError, StorageResult,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Cheapest work factor the cipher accepts. Test use only.
pub fn fast_kdf() -> KdfParams {
    KdfParams::new(MIN_ITERATIONS).expect("minimum iterations are in bounds")
}

/// Run configuration with the fast work factor.
pub fn fast_config() -> Config {
    Config::new().kdf(fast_kdf())
}

/// Cipher with the fast work factor.
pub fn fast_cipher() -> AuthenticatedCipher {
    AuthenticatedCipher::new(fast_kdf())
}

/// Parses a passphrase.
pub fn secret(passphrase: &str) -> Secret {
    Secret::parse(passphrase).expect("non-empty passphrase")
}

/// Encrypts `plaintext` the way legacy rows were written.
pub fn legacy_value(plaintext: &str, key: &Secret) -> String {
    LegacyCipher::new()
        .encrypt(plaintext, key)
        .expect("legacy encryption")
}

/// Encrypts `plaintext` into a current envelope.
pub fn current_value(plaintext: &str, key: &Secret) -> String {
    fast_cipher()
        .encrypt(plaintext, key)
        .expect("envelope encryption")
}

/// How a seeded field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    /// Legacy hex ciphertext.
    Legacy,
    /// Current envelope.
    Current,
    /// Garbage that neither scheme accepts.
    Corrupt,
    /// JSON null.
    Null,
}

/// Inserts `users` records `u000`, `u001`, ... with a `twofa_secret` field
/// following `pattern` cyclically. Returns `(id, plaintext)` of every
/// record holding a decryptable value.
pub fn seed_users(
    store: &dyn DocumentStore,
    key: &Secret,
    count: usize,
    pattern: &[Seed],
) -> Vec<(String, String)> {
    let mut expected = Vec::new();
    for i in 0..count {
        let id = format!("u{i:03}");
        let plaintext = format!("TOTP{i:04}SECRET");
        let value = match pattern[i % pattern.len()] {
            Seed::Legacy => serde_json::Value::String(legacy_value(&plaintext, key)),
            Seed::Current => serde_json::Value::String(current_value(&plaintext, key)),
            Seed::Corrupt => serde_json::Value::String(format!("corrupt-{i}")),
            Seed::Null => serde_json::Value::Null,
        };
        if matches!(pattern[i % pattern.len()], Seed::Legacy | Seed::Current) {
            expected.push((id.clone(), plaintext));
        }
        store
            .insert(
                "users",
                Document::new(id)
                    .with_field("email", format!("user{i}@example.org"))
                    .with_field("twofa_secret", value),
            )
            .expect("insert seeded user");
    }
    expected
}

/// Reads a string field, panicking if it is absent.
pub fn read_field(store: &dyn DocumentStore, collection: &str, id: &str, field: &str) -> String {
    store
        .get(collection, id)
        .expect("read document")
        .and_then(|doc| doc.str_field(field).map(str::to_string))
        .unwrap_or_else(|| panic!("{collection}/{id} has no string field {field}"))
}

/// A file-backed document store in a temporary directory.
pub struct TempFileStore {
    /// The store.
    pub store: FileStore,
    _dir: TempDir,
}

impl TempFileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(&dir.path().join("store"), true).expect("open file store");
        Self { store, _dir: dir }
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempFileStore {
    type Target = FileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A key provider over a fresh secret store.
pub struct TestKeys {
    /// The provider.
    pub provider: KeyProvider,
    _dir: Option<TempDir>,
}

impl TestKeys {
    /// Keys held in memory.
    pub fn memory() -> Self {
        Self {
            provider: KeyProvider::new(Arc::new(InMemorySecretStore::new())),
            _dir: None,
        }
    }

    /// Keys held in a temporary secrets directory.
    pub fn file() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileSecretStore::open(&dir.path().join("secrets")).expect("open secrets");
        Self {
            provider: KeyProvider::new(Arc::new(store)),
            _dir: Some(dir),
        }
    }
}

impl std::ops::Deref for TestKeys {
    type Target = KeyProvider;

    fn deref(&self) -> &Self::Target {
        &self.provider
    }
}

/// Wraps a store and overwrites chosen records just before their update,
/// as a user editing the record mid-run would.
pub struct InterferingStore {
    /// The wrapped store.
    pub inner: InMemoryStore,
    victims: Vec<String>,
}

impl InterferingStore {
    /// Interferes with updates of the listed record ids.
    pub fn new(inner: InMemoryStore, victims: &[&str]) -> Self {
        Self {
            inner,
            victims: victims.iter().map(|v| (*v).to_string()).collect(),
        }
    }
}

impl DocumentStore for InterferingStore {
    fn scan(&self, collection: &str, after: Option<&str>, limit: usize) -> StorageResult<Page> {
        self.inner.scan(collection, after, limit)
    }

    fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.inner.get(collection, id)
    }

    fn insert(&self, collection: &str, document: Document) -> StorageResult<()> {
        self.inner.insert(collection, document)
    }

    fn update(&self, collection: &str, id: &str, changes: &[FieldChange]) -> StorageResult<()> {
        if self.victims.iter().any(|v| v == id) {
            if let Some(mut doc) = self.inner.get(collection, id)? {
                for change in changes {
                    doc.fields
                        .insert(change.field.clone(), "edited-concurrently".into());
                }
                self.inner.put(collection, doc);
            }
        }
        self.inner.update(collection, id, changes)
    }
}

/// Wraps a store and fails every update after the first `allowed` with an
/// I/O error, as a lost connection would.
pub struct FlakyStore {
    /// The wrapped store.
    pub inner: InMemoryStore,
    allowed: usize,
    attempts: AtomicUsize,
}

impl FlakyStore {
    /// Allows `allowed` updates, then fails.
    pub fn new(inner: InMemoryStore, allowed: usize) -> Self {
        Self {
            inner,
            allowed,
            attempts: AtomicUsize::new(0),
        }
    }
}

impl DocumentStore for FlakyStore {
    fn scan(&self, collection: &str, after: Option<&str>, limit: usize) -> StorageResult<Page> {
        self.inner.scan(collection, after, limit)
    }

    fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.inner.get(collection, id)
    }

    fn insert(&self, collection: &str, document: Document) -> StorageResult<()> {
        self.inner.insert(collection, document)
    }

    fn update(&self, collection: &str, id: &str, changes: &[FieldChange]) -> StorageResult<()> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        self.inner.update(collection, id, changes)
    }
}
