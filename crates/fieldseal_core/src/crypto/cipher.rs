//! Current-scheme encryption using PBKDF2 + AES-256-GCM.

use super::envelope::{Envelope, NONCE_SIZE, TAG_SIZE};
use super::kdf::{derive_key, KdfParams, SALT_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::keys::Secret;
use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

/// Encrypts and decrypts field values in the current envelope format.
///
/// Every call to [`encrypt`](Self::encrypt) draws a fresh salt and nonce,
/// so encrypting the same value twice never yields the same envelope.
/// Decryption reads the work factor from the envelope, which lets old
/// envelopes stay readable after the configured work factor is raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticatedCipher {
    params: KdfParams,
}

impl AuthenticatedCipher {
    /// Creates a cipher that encrypts with the given work factor.
    #[must_use]
    pub const fn new(params: KdfParams) -> Self {
        Self { params }
    }

    /// Returns the work factor used for new envelopes.
    #[must_use]
    pub const fn params(&self) -> KdfParams {
        self.params
    }

    /// Encrypts `plaintext` under `secret` and returns the envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for an empty plaintext.
    pub fn encrypt(&self, plaintext: &str, secret: &Secret) -> CoreResult<String> {
        if plaintext.is_empty() {
            return Err(CoreError::invalid_input("plaintext must not be empty"));
        }

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let iterations = self.params.iterations();
        let key = derive_key(secret.expose(), &salt, self.params)?;
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                &Envelope::associated_data(iterations),
                &mut buffer,
            )
            .map_err(|_| CoreError::encryption_failed("AES-GCM encryption error"))?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(&tag);

        Ok(Envelope {
            iterations,
            salt,
            nonce,
            tag: tag_bytes,
            ciphertext: buffer,
        }
        .encode())
    }

    /// Decrypts an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// - [`CoreError::MalformedEnvelope`] if the string is not a structurally
    ///   valid envelope; no key derivation is attempted
    /// - [`CoreError::AuthenticationFailure`] if the tag does not verify
    ///   (wrong secret or tampered data)
    pub fn decrypt(&self, envelope: &str, secret: &Secret) -> CoreResult<Zeroizing<String>> {
        let envelope = Envelope::decode(envelope)?;
        let params = KdfParams::new(envelope.iterations)?;
        let key = derive_key(secret.expose(), &envelope.salt, params)?;
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));

        let mut buffer = Zeroizing::new(envelope.ciphertext.clone());
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&envelope.nonce),
                &Envelope::associated_data(envelope.iterations),
                buffer.as_mut_slice(),
                Tag::from_slice(&envelope.tag),
            )
            .map_err(|_| CoreError::AuthenticationFailure)?;

        match String::from_utf8(std::mem::take(&mut *buffer)) {
            Ok(text) => Ok(Zeroizing::new(text)),
            Err(e) => {
                e.into_bytes().zeroize();
                Err(CoreError::malformed("plaintext is not UTF-8"))
            }
        }
    }
}
