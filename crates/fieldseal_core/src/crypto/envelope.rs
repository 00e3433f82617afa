//! Current-scheme envelope layout.
//!
//! ```text
//! "fs2:" || base64url_nopad(
//!     0..4    iterations   u32 big-endian PBKDF2 work factor
//!     4..20   salt         16 bytes, random per encryption
//!    20..32   nonce        12 bytes, random per encryption
//!    32..48   tag          16-byte GCM authentication tag
//!    48..     ciphertext   same length as the plaintext
//! )
//! ```
//!
//! Every segment before the ciphertext has a fixed width, so decoding never
//! needs outside knowledge of component lengths. The `fs2:` marker never
//! appears in legacy values, which are bare hex. This layout is stable:
//! changing it is itself a format migration.

use super::kdf::{check_iterations, SALT_SIZE};
use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Structural marker that prefixes every current-scheme envelope.
pub const MARKER: &str = "fs2:";
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of the fixed-width header that precedes the ciphertext.
pub const HEADER_SIZE: usize = 4 + SALT_SIZE + NONCE_SIZE + TAG_SIZE;

/// Domain separation prefix of the AEAD associated data.
const AAD_PREFIX: &[u8] = b"fieldseal-envelope-v2";

/// Decoded components of a current-scheme envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    /// PBKDF2 iteration count used to derive the key.
    pub iterations: u32,
    /// Key derivation salt.
    pub salt: [u8; SALT_SIZE],
    /// AES-GCM nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// AES-GCM authentication tag.
    pub tag: [u8; TAG_SIZE],
    /// Encrypted payload.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encodes the envelope as its stored text form.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
        raw.extend_from_slice(&self.iterations.to_be_bytes());
        raw.extend_from_slice(&self.salt);
        raw.extend_from_slice(&self.nonce);
        raw.extend_from_slice(&self.tag);
        raw.extend_from_slice(&self.ciphertext);

        let mut out = String::with_capacity(MARKER.len() + (raw.len() * 4).div_ceil(3));
        out.push_str(MARKER);
        URL_SAFE_NO_PAD.encode_string(&raw, &mut out);
        out
    }

    /// Parses a stored text envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedEnvelope`] if the marker is missing, the
    /// body is not canonical unpadded base64url, the decoded body is shorter
    /// than [`HEADER_SIZE`], or the iteration count is out of bounds.
    pub fn decode(text: &str) -> CoreResult<Self> {
        let body = text
            .strip_prefix(MARKER)
            .ok_or_else(|| CoreError::malformed("missing envelope marker"))?;

        let raw = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| CoreError::malformed(format!("invalid base64 body: {e}")))?;

        if raw.len() < HEADER_SIZE {
            return Err(CoreError::malformed(format!(
                "envelope too short: {} bytes, need at least {HEADER_SIZE}",
                raw.len()
            )));
        }

        let (iterations, rest) = raw.split_at(4);
        let (salt, rest) = rest.split_at(SALT_SIZE);
        let (nonce, rest) = rest.split_at(NONCE_SIZE);
        let (tag, ciphertext) = rest.split_at(TAG_SIZE);

        let iterations = u32::from_be_bytes([iterations[0], iterations[1], iterations[2], iterations[3]]);
        check_iterations(iterations)
            .map_err(|_| CoreError::malformed(format!("iteration count {iterations} out of bounds")))?;

        let mut envelope = Self {
            iterations,
            salt: [0u8; SALT_SIZE],
            nonce: [0u8; NONCE_SIZE],
            tag: [0u8; TAG_SIZE],
            ciphertext: ciphertext.to_vec(),
        };
        envelope.salt.copy_from_slice(salt);
        envelope.nonce.copy_from_slice(nonce);
        envelope.tag.copy_from_slice(tag);
        Ok(envelope)
    }

    /// Returns the associated data authenticated alongside the ciphertext.
    ///
    /// Binds the format version and the work factor, so neither can be
    /// altered without failing authentication.
    #[must_use]
    pub fn associated_data(iterations: u32) -> Vec<u8> {
        let mut aad = Vec::with_capacity(AAD_PREFIX.len() + 4);
        aad.extend_from_slice(AAD_PREFIX);
        aad.extend_from_slice(&iterations.to_be_bytes());
        aad
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("iterations", &self.iterations)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            iterations: 210_000,
            salt: [1u8; SALT_SIZE],
            nonce: [2u8; NONCE_SIZE],
            tag: [3u8; TAG_SIZE],
            ciphertext: b"opaque".to_vec(),
        }
    }

    #[test]
    fn encode_has_marker_and_decodes() {
        let env = sample();
        let text = env.encode();
        assert!(text.starts_with(MARKER));
        assert_eq!(Envelope::decode(&text).unwrap(), env);
    }

    #[test]
    fn header_only_envelope_is_valid() {
        let mut env = sample();
        env.ciphertext.clear();
        let decoded = Envelope::decode(&env.encode()).unwrap();
        assert!(decoded.ciphertext.is_empty());
    }

    #[test]
    fn missing_marker() {
        let text = sample().encode();
        let result = Envelope::decode(&text[MARKER.len()..]);
        assert!(matches!(result, Err(CoreError::MalformedEnvelope { .. })));
    }

    #[test]
    fn too_short() {
        let short = format!("{MARKER}{}", URL_SAFE_NO_PAD.encode([0u8; HEADER_SIZE - 1]));
        assert!(matches!(
            Envelope::decode(&short),
            Err(CoreError::MalformedEnvelope { .. })
        ));
        assert!(Envelope::decode(MARKER).is_err());
    }

    #[test]
    fn invalid_characters() {
        let mut text = sample().encode();
        text.push('!');
        assert!(matches!(
            Envelope::decode(&text),
            Err(CoreError::MalformedEnvelope { .. })
        ));
        // Standard alphabet and padding are not accepted.
        assert!(Envelope::decode(&format!("{MARKER}AAAA+/==")).is_err());
    }

    #[test]
    fn iteration_bounds_checked() {
        let mut env = sample();
        env.iterations = u32::MAX;
        assert!(Envelope::decode(&env.encode()).is_err());
        env.iterations = 0;
        assert!(Envelope::decode(&env.encode()).is_err());
    }

    #[test]
    fn associated_data_binds_iterations() {
        assert_ne!(
            Envelope::associated_data(100_000),
            Envelope::associated_data(100_001)
        );
    }
}
