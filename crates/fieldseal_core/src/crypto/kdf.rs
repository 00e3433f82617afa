//! Passphrase-based key derivation (PBKDF2-HMAC-SHA256).

use crate::error::{CoreError, CoreResult};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the derived AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the per-encryption salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Iteration count used when none is configured.
pub const DEFAULT_ITERATIONS: u32 = 210_000;
/// Lowest iteration count accepted by [`crate::Config::validate`].
pub const RECOMMENDED_MIN_ITERATIONS: u32 = 100_000;
/// Hard floor, also enforced when reading an envelope.
pub const MIN_ITERATIONS: u32 = 1_000;
/// Hard ceiling, so a forged envelope cannot demand unbounded work.
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Work factor for [`derive_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
}

impl KdfParams {
    /// Creates parameters with the given iteration count.
    ///
    /// # Errors
    ///
    /// Returns an error if `iterations` is outside
    /// [`MIN_ITERATIONS`]..=[`MAX_ITERATIONS`].
    pub fn new(iterations: u32) -> CoreResult<Self> {
        check_iterations(iterations)?;
        Ok(Self { iterations })
    }

    /// Returns the iteration count.
    #[must_use]
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Returns true if the work factor meets the production minimum.
    #[must_use]
    pub const fn is_recommended(&self) -> bool {
        self.iterations >= RECOMMENDED_MIN_ITERATIONS
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

pub(crate) fn check_iterations(iterations: u32) -> CoreResult<()> {
    if (MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
        Ok(())
    } else {
        Err(CoreError::key_derivation(format!(
            "iteration count {iterations} outside {MIN_ITERATIONS}..={MAX_ITERATIONS}"
        )))
    }
}

/// A derived AES-256 key.
///
/// The key is zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Returns the key bytes.
    ///
    /// # Security
    ///
    /// Don't log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derives a 256-bit key from `secret` and `salt` using PBKDF2-HMAC-SHA256.
///
/// Equal inputs always produce equal keys; different salts produce
/// unrelated keys.
///
/// # Errors
///
/// Returns an error if the secret is empty or the salt is not
/// [`SALT_SIZE`] bytes.
pub fn derive_key(secret: &[u8], salt: &[u8], params: KdfParams) -> CoreResult<DerivedKey> {
    if secret.is_empty() {
        return Err(CoreError::invalid_input("secret must not be empty"));
    }
    if salt.len() != SALT_SIZE {
        return Err(CoreError::invalid_input(format!(
            "salt must be {SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }

    let mut key = DerivedKey {
        bytes: [0u8; KEY_SIZE],
    };
    pbkdf2_hmac::<Sha256>(secret, salt, params.iterations, &mut key.bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(MIN_ITERATIONS).unwrap()
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let salt = [7u8; SALT_SIZE];
        let a = derive_key(b"passphrase", &salt, fast()).unwrap();
        let b = derive_key(b"passphrase", &salt, fast()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_salt_different_key() {
        let a = derive_key(b"passphrase", &[1u8; SALT_SIZE], fast()).unwrap();
        let b = derive_key(b"passphrase", &[2u8; SALT_SIZE], fast()).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_iterations_different_key() {
        let salt = [3u8; SALT_SIZE];
        let a = derive_key(b"passphrase", &salt, fast()).unwrap();
        let b = derive_key(b"passphrase", &salt, KdfParams::new(MIN_ITERATIONS + 1).unwrap())
            .unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn rfc7914_vector() {
        // PBKDF2-HMAC-SHA256 test vector from RFC 7914 section 11, truncated to 32 bytes.
        let mut out = [0u8; 32];
        pbkdf2_hmac::<Sha256>(b"passwd", b"salt", 1, &mut out);
        assert_eq!(
            hex::encode(out),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn empty_secret_rejected() {
        let result = derive_key(b"", &[0u8; SALT_SIZE], fast());
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
    }

    #[test]
    fn wrong_salt_length_rejected() {
        assert!(derive_key(b"k", &[0u8; 8], fast()).is_err());
    }

    #[test]
    fn iteration_bounds() {
        assert!(KdfParams::new(MIN_ITERATIONS - 1).is_err());
        assert!(KdfParams::new(MAX_ITERATIONS + 1).is_err());
        assert!(KdfParams::default().is_recommended());
        assert!(!fast().is_recommended());
    }

    #[test]
    fn debug_is_redacted() {
        let key = derive_key(b"k", &[0u8; SALT_SIZE], fast()).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
