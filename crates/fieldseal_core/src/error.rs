//! Error types for fieldseal core.

use fieldseal_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in fieldseal core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage or secret store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Report serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The envelope string is structurally invalid. No decryption was tried.
    #[error("malformed envelope: {message}")]
    MalformedEnvelope {
        /// Description of the structural problem.
        message: String,
    },

    /// The authentication tag did not verify: wrong key or tampered data.
    #[error("authentication failed: wrong key or tampered data")]
    AuthenticationFailure,

    /// A legacy-format value could not be decrypted.
    #[error("legacy decryption failed: {message}")]
    LegacyDecryptionFailure {
        /// Description of the failure.
        message: String,
    },

    /// A freshly sealed envelope did not decrypt back to the original.
    #[error("verification mismatch for {collection}/{record_id} field {field}")]
    VerificationMismatch {
        /// Collection of the record.
        collection: String,
        /// Record identifier.
        record_id: String,
        /// Field that failed verification.
        field: String,
    },

    /// Missing or invalid configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// Invalid caller input (empty secret, empty plaintext, bad lengths).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivation {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// A field is in a state the current operation cannot handle.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A secret id is not present in the secret store.
    #[error("secret not found: {id}")]
    SecretNotFound {
        /// The secret id.
        id: String,
    },

    /// The key cutover gate refused to switch keys.
    #[error("cutover refused: {message}")]
    CutoverRefused {
        /// Why the cutover was refused.
        message: String,
    },
}

impl CoreError {
    /// Creates a malformed envelope error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }

    /// Creates a legacy decryption failure.
    pub fn legacy_decryption_failed(message: impl Into<String>) -> Self {
        Self::LegacyDecryptionFailure {
            message: message.into(),
        }
    }

    /// Creates a verification mismatch error.
    pub fn verification_mismatch(
        collection: impl Into<String>,
        record_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::VerificationMismatch {
            collection: collection.into(),
            record_id: record_id.into(),
            field: field.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a key derivation error.
    pub fn key_derivation(message: impl Into<String>) -> Self {
        Self::KeyDerivation {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a secret not found error.
    pub fn secret_not_found(id: impl Into<String>) -> Self {
        Self::SecretNotFound { id: id.into() }
    }

    /// Creates a cutover refused error.
    pub fn cutover_refused(message: impl Into<String>) -> Self {
        Self::CutoverRefused {
            message: message.into(),
        }
    }

    /// Returns true if this error must abort a bulk run.
    ///
    /// Per-record problems (bad ciphertext, a concurrent edit of one
    /// document) are local. Configuration, missing secrets and store
    /// connectivity problems are not.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Storage(e) => matches!(e, StorageError::Io(_) | StorageError::Locked),
            Self::Io(_) | Self::Configuration { .. } | Self::SecretNotFound { .. } => true,
            _ => false,
        }
    }
}
