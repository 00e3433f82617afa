//! Secret material and the key provider.
//!
//! [`Secret`] wraps operator-supplied key material (a passphrase or a
//! base64 blob). It is only ever used as KDF input, is wiped on drop, and
//! never prints its value.
//!
//! [`KeyProvider`] is the single injected access point to a
//! [`SecretStore`]. It is built once per process and passed by reference
//! to whatever needs keys. When the backing store is remote, an optional
//! bounded TTL cache avoids refetching on every call.

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use fieldseal_storage::SecretStore;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

/// Prefix marking a secret given as standard base64 bytes.
pub const BASE64_PREFIX: &str = "base64:";

/// Size of generated secrets before text encoding.
const GENERATED_SECRET_BYTES: usize = 32;

/// Key material used as PBKDF input.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    bytes: Zeroizing<Vec<u8>>,
}

impl Secret {
    /// Wraps raw key material.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is empty.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> CoreResult<Self> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.is_empty() {
            return Err(CoreError::invalid_input("secret must not be empty"));
        }
        Ok(Self { bytes })
    }

    /// Parses operator input: `base64:<standard base64>` or a UTF-8
    /// passphrase used verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or the base64 form is invalid.
    pub fn parse(text: &str) -> CoreResult<Self> {
        match text.strip_prefix(BASE64_PREFIX) {
            Some(encoded) => {
                let decoded = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| CoreError::invalid_input(format!("invalid base64 secret: {e}")))?;
                Self::from_bytes(decoded)
            }
            None => Self::from_bytes(text.as_bytes().to_vec()),
        }
    }

    /// Generates a fresh random passphrase (32 random bytes, base64url text).
    #[must_use]
    pub fn generate() -> Self {
        let mut raw = Zeroizing::new([0u8; GENERATED_SECRET_BYTES]);
        OsRng.fill_bytes(&mut *raw);
        Self {
            bytes: Zeroizing::new(URL_SAFE_NO_PAD.encode(raw.as_slice()).into_bytes()),
        }
    }

    /// Returns the key material.
    ///
    /// # Security
    ///
    /// Don't log or persist the result outside a secret store.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns a short, non-reversible identifier for logs and reports.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes.as_slice());
        hex::encode(&digest[..4])
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("bytes", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Cache settings for [`KeyProvider`].
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// How long a fetched secret stays valid.
    pub ttl: Duration,
    /// Maximum number of cached ids.
    pub max_entries: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 16,
        }
    }
}

struct CacheEntry {
    secret: Secret,
    fetched_at: Instant,
}

/// Injected access to key material held by a [`SecretStore`].
pub struct KeyProvider {
    store: Arc<dyn SecretStore>,
    policy: Option<CachePolicy>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl KeyProvider {
    /// Creates a provider without caching.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            policy: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Enables the bounded TTL cache.
    #[must_use]
    pub fn with_cache(mut self, policy: CachePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Fetches the secret stored under `id`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SecretNotFound`] if nothing is stored under `id`
    /// - [`CoreError::InvalidInput`] if the stored value is empty
    /// - [`CoreError::Storage`] if the store cannot be read
    pub fn get(&self, id: &str) -> CoreResult<Secret> {
        if let Some(policy) = self.policy {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(id) {
                if entry.fetched_at.elapsed() < policy.ttl {
                    return Ok(entry.secret.clone());
                }
                cache.remove(id);
            }
        }

        let raw = self
            .store
            .get(id)?
            .ok_or_else(|| CoreError::secret_not_found(id))?;
        let text = std::str::from_utf8(&raw)
            .map_err(|_| CoreError::invalid_input(format!("secret {id} is not UTF-8")))?;
        let secret = Secret::parse(text)?;

        if let Some(policy) = self.policy {
            let mut cache = self.cache.lock();
            cache.retain(|_, entry| entry.fetched_at.elapsed() < policy.ttl);
            if cache.len() >= policy.max_entries {
                // Evict the oldest entry to stay within bounds.
                if let Some(oldest) = cache
                    .iter()
                    .min_by_key(|(_, entry)| entry.fetched_at)
                    .map(|(k, _)| k.clone())
                {
                    cache.remove(&oldest);
                }
            }
            if policy.max_entries > 0 {
                cache.insert(
                    id.to_string(),
                    CacheEntry {
                        secret: secret.clone(),
                        fetched_at: Instant::now(),
                    },
                );
            }
        }

        tracing::debug!(id, fingerprint = %secret.fingerprint(), "loaded secret");
        Ok(secret)
    }

    /// Returns true if a secret is stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn contains(&self, id: &str) -> CoreResult<bool> {
        Ok(self.store.get(id)?.is_some())
    }

    /// Stores `secret` under `id` and drops any cached copy.
    ///
    /// Secrets that a text-oriented holder could alter on the way back are
    /// stored in their `base64:` form: binary secrets, and text with control
    /// characters or surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn publish(&self, id: &str, secret: &Secret) -> CoreResult<()> {
        let text = match std::str::from_utf8(secret.expose()) {
            Ok(text) if stores_verbatim(text) => Zeroizing::new(text.to_string()),
            _ => Zeroizing::new(format!("{BASE64_PREFIX}{}", STANDARD.encode(secret.expose()))),
        };
        self.store.put(id, text.as_bytes())?;
        self.invalidate(id);
        tracing::info!(id, fingerprint = %secret.fingerprint(), "published secret");
        Ok(())
    }

    /// Drops a cached secret.
    pub fn invalidate(&self, id: &str) {
        self.cache.lock().remove(id);
    }

    /// Returns the number of cached secrets.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("policy", &self.policy)
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}

fn stores_verbatim(text: &str) -> bool {
    !text.starts_with(BASE64_PREFIX)
        && text.trim() == text
        && !text.chars().any(char::is_control)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldseal_storage::InMemorySecretStore;

    #[test]
    fn empty_secret_rejected() {
        assert!(Secret::parse("").is_err());
        assert!(Secret::parse("base64:").is_err());
        assert!(Secret::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn parse_base64_and_passphrase() {
        let blob = Secret::parse("base64:AAEC").unwrap();
        assert_eq!(blob.expose(), &[0, 1, 2]);
        let phrase = Secret::parse("correct-horse-battery").unwrap();
        assert_eq!(phrase.expose(), b"correct-horse-battery");
        assert!(Secret::parse("base64:not base64!").is_err());
    }

    #[test]
    fn generated_secrets_differ() {
        let a = Secret::generate();
        let b = Secret::generate();
        assert_ne!(a, b);
        assert_eq!(a.expose().len(), 43);
    }

    #[test]
    fn debug_is_redacted() {
        let secret = Secret::parse("hunter2").unwrap();
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn provider_get_and_missing() {
        let store = Arc::new(InMemorySecretStore::new());
        store.put("key.current", b"pass").unwrap();
        let provider = KeyProvider::new(store);
        assert_eq!(provider.get("key.current").unwrap().expose(), b"pass");
        assert!(matches!(
            provider.get("key.none"),
            Err(CoreError::SecretNotFound { .. })
        ));
    }

    #[test]
    fn provider_cache_serves_until_invalidated() {
        let store = Arc::new(InMemorySecretStore::new());
        store.put("k", b"one").unwrap();
        let provider = KeyProvider::new(store.clone()).with_cache(CachePolicy::default());

        assert_eq!(provider.get("k").unwrap().expose(), b"one");
        store.put("k", b"two").unwrap();
        assert_eq!(provider.get("k").unwrap().expose(), b"one");

        provider.invalidate("k");
        assert_eq!(provider.get("k").unwrap().expose(), b"two");
    }

    #[test]
    fn provider_cache_expires() {
        let store = Arc::new(InMemorySecretStore::new());
        store.put("k", b"one").unwrap();
        let provider = KeyProvider::new(store.clone()).with_cache(CachePolicy {
            ttl: Duration::ZERO,
            max_entries: 4,
        });

        provider.get("k").unwrap();
        store.put("k", b"two").unwrap();
        assert_eq!(provider.get("k").unwrap().expose(), b"two");
    }

    #[test]
    fn provider_cache_is_bounded() {
        let store = Arc::new(InMemorySecretStore::new());
        for i in 0..5 {
            store.put(&format!("k{i}"), b"v").unwrap();
        }
        let provider = KeyProvider::new(store).with_cache(CachePolicy {
            ttl: Duration::from_secs(60),
            max_entries: 2,
        });
        for i in 0..5 {
            provider.get(&format!("k{i}")).unwrap();
        }
        assert_eq!(provider.cached_len(), 2);
    }

    #[test]
    fn publish_binary_secret_roundtrips() {
        let store = Arc::new(InMemorySecretStore::new());
        let provider = KeyProvider::new(store.clone());
        let binary = Secret::from_bytes(vec![0xff, 0x00, 0x10]).unwrap();
        provider.publish("k", &binary).unwrap();
        assert!(store.get("k").unwrap().unwrap().starts_with(BASE64_PREFIX.as_bytes()));
        assert_eq!(provider.get("k").unwrap(), binary);
    }

    #[test]
    fn publish_through_files_keeps_edge_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = fieldseal_storage::FileSecretStore::open(dir.path()).unwrap();
        let provider = KeyProvider::new(Arc::new(store));

        for text in ["rotate-me\n", "rotate-me\r\n", "  padded  ", "tab\there"] {
            let secret = Secret::parse(text).unwrap();
            provider.publish("fieldseal.next", &secret).unwrap();
            let read = provider.get("fieldseal.next").unwrap();
            assert_eq!(read, secret, "{text:?}");
            assert_eq!(read.fingerprint(), secret.fingerprint());
        }

        let plain = Secret::parse("rotate-me").unwrap();
        provider.publish("fieldseal.next", &plain).unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("fieldseal.next")).unwrap(),
            b"rotate-me"
        );
    }
}
