//! Known-answer vectors for both ciphers.
//!
//! Legacy vectors match `openssl enc -aes-256-cbc -md md5 -nosalt`.
//! Key derivation vectors match any PBKDF2-HMAC-SHA256 implementation.

use serde::{Deserialize, Serialize};

/// A known-answer vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Passphrase the value is keyed with.
    pub passphrase: String,
    /// Input (plaintext, or hex salt for key derivation).
    pub input: String,
    /// Extra parameter (iteration count for key derivation).
    pub param: Option<u32>,
    /// Expected output, hex-encoded.
    pub expected_hex: String,
}

/// Legacy AES-256-CBC vectors.
pub fn legacy_vectors() -> Vec<TestVector> {
    vec![
        TestVector {
            id: "legacy_totp_seed".into(),
            description: "Sixteen-byte plaintext pads to two blocks".into(),
            passphrase: "correct-horse-battery".into(),
            input: "6DTFQJCJXV7A5TPP".into(),
            param: None,
            expected_hex: "66c3de0c45768d5861c386760704d5e461416a128d63aaafe1bd348336df541f"
                .into(),
        },
        TestVector {
            id: "legacy_short".into(),
            description: "Short plaintext fits one block".into(),
            passphrase: "legacy".into(),
            input: "abc".into(),
            param: None,
            expected_hex: "7ac54f2d127c18cea4fb253a1005fd40".into(),
        },
    ]
}

/// PBKDF2-HMAC-SHA256 derivation vectors.
pub fn kdf_vectors() -> Vec<TestVector> {
    vec![
        TestVector {
            id: "kdf_counting_salt".into(),
            description: "Salt 00..0f at the minimum work factor".into(),
            passphrase: "correct-horse-battery".into(),
            input: "000102030405060708090a0b0c0d0e0f".into(),
            param: Some(1_000),
            expected_hex: "cf5fdec344c008be6d93cce0b208169c5b8602a3636974c05ecbf49e7817c82b"
                .into(),
        },
        TestVector {
            id: "kdf_saturated_salt".into(),
            description: "Salt of all 0xff bytes at the minimum work factor".into(),
            passphrase: "legacy".into(),
            input: "ffffffffffffffffffffffffffffffff".into(),
            param: Some(1_000),
            expected_hex: "97b7c2200ebab001f9fa72d4ccb19ec232b1c555059b5e0a008357e6286b28ef"
                .into(),
        },
    ]
}

/// All vectors.
pub fn all_vectors() -> Vec<TestVector> {
    let mut vectors = legacy_vectors();
    vectors.extend(kdf_vectors());
    vectors
}
