//! Secret holder interface.
//!
//! Secret stores hold raw key material (passphrases) by id. They are used
//! to read the active key and to publish a new key during rotation. Values
//! are returned in [`Zeroizing`] buffers so they are wiped when dropped.

use crate::backend::validate_identifier;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// An external holder of secret material, addressed by id.
pub trait SecretStore: Send + Sync {
    /// Reads the secret stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or the holder cannot be read.
    fn get(&self, id: &str) -> StorageResult<Option<Zeroizing<Vec<u8>>>>;

    /// Stores `secret` under `id`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or the holder cannot be written.
    fn put(&self, id: &str, secret: &[u8]) -> StorageResult<()>;
}

/// Secret store kept in process memory.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.secrets.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for InMemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySecretStore")
            .field("ids", &self.ids())
            .finish()
    }
}

impl SecretStore for InMemorySecretStore {
    fn get(&self, id: &str) -> StorageResult<Option<Zeroizing<Vec<u8>>>> {
        validate_identifier(id)?;
        Ok(self.secrets.read().get(id).cloned())
    }

    fn put(&self, id: &str, secret: &[u8]) -> StorageResult<()> {
        validate_identifier(id)?;
        self.secrets
            .write()
            .insert(id.to_string(), Zeroizing::new(secret.to_vec()));
        Ok(())
    }
}

/// Secret store backed by a directory, one file per id.
///
/// Files are created with mode `0600` on Unix and replaced atomically.
#[derive(Debug)]
pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    /// Opens (and creates if needed) the secrets directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, id: &str) -> StorageResult<Option<Zeroizing<Vec<u8>>>> {
        validate_identifier(id)?;
        match fs::read(self.path(id)) {
            Ok(bytes) => {
                let mut bytes = Zeroizing::new(bytes);
                // Editors and `echo` leave a trailing newline behind.
                while matches!(bytes.last(), Some(b'\n' | b'\r')) {
                    bytes.pop();
                }
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn put(&self, id: &str, secret: &[u8]) -> StorageResult<()> {
        validate_identifier(id)?;
        let target = self.path(id);
        let temp = self.root.join(format!(".{id}.tmp"));

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        {
            let mut file = options.open(&temp)?;
            file.write_all(secret)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &target)?;
        tracing::debug!(id, "stored secret");
        Ok(())
    }
}
