//! Cryptographic operations for fieldseal.
//!
//! ## Security Model
//!
//! - New values use AES-256-GCM, keyed by PBKDF2-HMAC-SHA256
//! - Unique salt and nonce per encryption operation
//! - The work factor travels in the envelope and is authenticated
//! - Legacy values (AES-256-CBC, key-derived IV) are decrypt-only
//! - Derived keys and decrypted plaintext are zeroized on drop
//!
//! ## Usage
//!
//! ```
//! use fieldseal_core::crypto::{classify, AuthenticatedCipher, Format, KdfParams};
//! use fieldseal_core::Secret;
//!
//! let cipher = AuthenticatedCipher::new(KdfParams::new(1_000)?);
//! let key = Secret::parse("correct-horse-battery")?;
//!
//! let envelope = cipher.encrypt("6DTFQJCJXV7A5TPP", &key)?;
//! assert_eq!(classify(&envelope), Format::Current);
//! assert_eq!(cipher.decrypt(&envelope, &key)?.as_str(), "6DTFQJCJXV7A5TPP");
//! # Ok::<(), fieldseal_core::CoreError>(())
//! ```

mod cipher;
mod envelope;
mod kdf;
mod legacy;
mod sniff;

pub use cipher::AuthenticatedCipher;
pub use envelope::{Envelope, HEADER_SIZE, MARKER, NONCE_SIZE, TAG_SIZE};
pub use kdf::{
    derive_key, DerivedKey, KdfParams, DEFAULT_ITERATIONS, KEY_SIZE, MAX_ITERATIONS,
    MIN_ITERATIONS, RECOMMENDED_MIN_ITERATIONS, SALT_SIZE,
};
pub use legacy::{is_legacy_shaped, LegacyCipher, BLOCK_SIZE};
pub use sniff::{classify, Format};
