//! Legacy-scheme decryption.
//!
//! Values written before the envelope format existed are lowercase hex of
//! AES-256-CBC ciphertext with PKCS#7 padding. Key and IV are both derived
//! from the passphrase alone with OpenSSL's `EVP_BytesToKey` (MD5, no salt,
//! one round), so equal plaintexts under one key give equal ciphertexts and
//! nothing is authenticated. The scheme is kept readable for migration only.
//!
//! Encryption is compiled only for tests and behind the `legacy-encrypt`
//! feature, which fixture generation uses.

use crate::error::{CoreError, CoreResult};
use crate::keys::Secret;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use md5::{Digest, Md5};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;
const KEY_SIZE: usize = 32;
const IV_SIZE: usize = 16;

/// Key and IV derived from a passphrase.
#[derive(Zeroize, ZeroizeOnDrop)]
struct LegacyKey {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl LegacyKey {
    /// `EVP_BytesToKey(md5, salt = none, count = 1)`:
    /// `D_i = MD5(D_{i-1} || secret)`, concatenated until key and IV are filled.
    fn derive(secret: &[u8]) -> Self {
        let mut material = Zeroizing::new([0u8; KEY_SIZE + IV_SIZE]);
        let mut previous: Option<Zeroizing<[u8; 16]>> = None;

        for chunk in material.chunks_mut(16) {
            let mut hasher = Md5::new();
            if let Some(prev) = &previous {
                hasher.update(prev.as_slice());
            }
            hasher.update(secret);
            let digest: Zeroizing<[u8; 16]> = Zeroizing::new(hasher.finalize().into());
            chunk.copy_from_slice(digest.as_slice());
            previous = Some(digest);
        }

        let mut derived = Self {
            key: [0u8; KEY_SIZE],
            iv: [0u8; IV_SIZE],
        };
        derived.key.copy_from_slice(&material[..KEY_SIZE]);
        derived.iv.copy_from_slice(&material[KEY_SIZE..]);
        derived
    }
}

/// Returns true if `text` has the shape of a legacy value: non-empty hex
/// whose decoded length is a whole number of cipher blocks.
#[must_use]
pub fn is_legacy_shaped(text: &str) -> bool {
    !text.is_empty()
        && text.len() % (BLOCK_SIZE * 2) == 0
        && text.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_disallowed_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Reader for the pre-envelope scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCipher;

impl LegacyCipher {
    /// Creates a legacy cipher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decrypts a legacy hex value.
    ///
    /// Wrong keys usually surface as a padding error. The rare wrong-key
    /// result that happens to carry valid padding is caught by requiring
    /// UTF-8 text without control characters. Tab, line feed and carriage
    /// return are allowed since stored values may span lines.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LegacyDecryptionFailure`] on bad hex, a length
    /// that is not a whole number of blocks, bad padding, an empty result,
    /// or output that is not printable text.
    pub fn decrypt(&self, legacy: &str, secret: &Secret) -> CoreResult<Zeroizing<String>> {
        if !is_legacy_shaped(legacy) {
            return Err(CoreError::legacy_decryption_failed(
                "value is not block-aligned hex",
            ));
        }
        let ciphertext = hex::decode(legacy)
            .map_err(|e| CoreError::legacy_decryption_failed(format!("invalid hex: {e}")))?;

        let derived = LegacyKey::derive(secret.expose());
        let cipher = Aes256CbcDec::new(
            GenericArray::from_slice(&derived.key),
            GenericArray::from_slice(&derived.iv),
        );
        let plaintext = Zeroizing::new(
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                .map_err(|_| CoreError::legacy_decryption_failed("bad padding (wrong key?)"))?,
        );

        if plaintext.is_empty() {
            return Err(CoreError::legacy_decryption_failed("decrypted value is empty"));
        }
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CoreError::legacy_decryption_failed("decrypted value is not UTF-8 (wrong key?)"))?;
        if text.chars().any(is_disallowed_control) {
            return Err(CoreError::legacy_decryption_failed(
                "decrypted value contains control characters (wrong key?)",
            ));
        }
        Ok(Zeroizing::new(text.to_string()))
    }

    /// Encrypts `plaintext` the way legacy values were written.
    ///
    /// Only for reproducing stored data in tests and fixtures.
    #[cfg(any(test, feature = "legacy-encrypt"))]
    pub fn encrypt(&self, plaintext: &str, secret: &Secret) -> CoreResult<String> {
        use aes::cipher::BlockEncryptMut;
        type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

        if plaintext.is_empty() {
            return Err(CoreError::invalid_input("plaintext must not be empty"));
        }
        let derived = LegacyKey::derive(secret.expose());
        let cipher = Aes256CbcEnc::new(
            GenericArray::from_slice(&derived.key),
            GenericArray::from_slice(&derived.iv),
        );
        Ok(hex::encode(
            cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        ))
    }
}
