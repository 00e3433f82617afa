//! # fieldseal Core
//!
//! Encryption at rest for sensitive document fields.
//!
//! This crate provides:
//! - An authenticated envelope (PBKDF2-HMAC-SHA256 + AES-256-GCM) for new writes
//! - Decryption of the legacy AES-256-CBC format
//! - Key-free classification of stored values
//! - A verified, idempotent legacy to current migration driver
//! - Key rotation with a manual cutover gate
//!
//! Stores are reached only through the traits in `fieldseal_storage`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
mod error;
pub mod keys;
pub mod migration;
pub mod schema;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use keys::{CachePolicy, KeyProvider, Secret};
pub use migration::{
    CancelToken, KeyRotation, MigrationDriver, MigrationKeys, MigrationObserver, RotationDriver,
    RunSummary,
};
pub use schema::{CollectionSchema, FieldSpec, Schema, SecretKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
