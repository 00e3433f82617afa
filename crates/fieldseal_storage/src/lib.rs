//! # fieldseal Storage
//!
//! Collaborator interfaces for fieldseal.
//!
//! The encryption core never talks to a database or a secret manager
//! directly. It consumes two narrow traits:
//!
//! - [`DocumentStore`] - paged scans and atomic compare-and-set updates of
//!   documents whose encrypted fields are opaque strings
//! - [`SecretStore`] - get/put of key material by id
//!
//! Stores do not interpret the values they hold.
//!
//! ## Available Implementations
//!
//! - [`InMemoryStore`] / [`InMemorySecretStore`] - For testing
//! - [`FileStore`] / [`FileSecretStore`] - Directory-backed, for operators
//!   running migrations against an exported data set
//!
//! ## Example
//!
//! ```rust
//! use fieldseal_storage::{Document, DocumentStore, FieldChange, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.insert("users", Document::new("u1").with_field("twofa", "old")).unwrap();
//! store
//!     .update("users", "u1", &[FieldChange::replace("twofa", "old", "new".into())])
//!     .unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod secrets;

pub use backend::{validate_identifier, Document, DocumentStore, FieldChange, Page, MAX_IDENTIFIER_LEN};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use secrets::{FileSecretStore, InMemorySecretStore, SecretStore};
