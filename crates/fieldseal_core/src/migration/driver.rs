//! Legacy to current re-encryption.

use super::report::{RecordLog, RunSummary};
use super::runner::{seal_verified, FieldAction, FieldRef, FieldTransform, Runner};
use super::{CancelToken, MigrationObserver, NoopObserver};
use crate::config::Config;
use crate::crypto::{AuthenticatedCipher, Format, LegacyCipher};
use crate::error::{CoreError, CoreResult};
use crate::keys::Secret;
use crate::schema::Schema;
use fieldseal_storage::DocumentStore;
use zeroize::Zeroizing;

/// Keys used by a migration run.
#[derive(Debug, Clone)]
pub struct MigrationKeys {
    current: Secret,
    legacy: Vec<Secret>,
}

impl MigrationKeys {
    /// Creates keys that read legacy values with `current` and write with it.
    #[must_use]
    pub fn new(current: Secret) -> Self {
        Self {
            current,
            legacy: Vec::new(),
        }
    }

    /// Adds a legacy key, tried in the order added.
    #[must_use]
    pub fn legacy_key(mut self, secret: Secret) -> Self {
        if !self.legacy.contains(&secret) {
            self.legacy.push(secret);
        }
        self
    }

    /// Returns the key new envelopes are written under.
    #[must_use]
    pub fn current(&self) -> &Secret {
        &self.current
    }

    /// Keys to try on a legacy value: every legacy key in order, then the
    /// current key, which covers data whose key was already rotated once.
    fn decryption_order(&self) -> impl Iterator<Item = &Secret> {
        let current = (!self.legacy.contains(&self.current)).then_some(&self.current);
        self.legacy.iter().chain(current)
    }
}

struct MigrateField<'a> {
    cipher: AuthenticatedCipher,
    legacy: LegacyCipher,
    keys: &'a MigrationKeys,
}

impl MigrateField<'_> {
    fn decrypt_legacy(&self, value: &str) -> CoreResult<Zeroizing<String>> {
        let mut last = None;
        for key in self.keys.decryption_order() {
            match self.legacy.decrypt(value, key) {
                Ok(plaintext) => return Ok(plaintext),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| CoreError::configuration("no legacy keys configured")))
    }
}

impl FieldTransform for MigrateField<'_> {
    fn apply(&self, field: &FieldRef<'_>, value: &str) -> CoreResult<FieldAction> {
        match field.format {
            Format::Current => Ok(FieldAction::Keep),
            Format::Legacy => {
                let plaintext = self.decrypt_legacy(value)?;
                let sealed = seal_verified(&self.cipher, &plaintext, self.keys.current(), field)?;
                Ok(FieldAction::Replace(sealed))
            }
            Format::Unrecognized => Err(CoreError::malformed(
                "value is neither a legacy value nor a current envelope",
            )),
        }
    }
}

/// Re-encrypts legacy fields into current envelopes.
///
/// # Example
///
/// ```
/// use fieldseal_core::crypto::KdfParams;
/// use fieldseal_core::migration::{MigrationDriver, MigrationKeys};
/// use fieldseal_core::{Config, Schema, Secret};
/// use fieldseal_storage::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// let schema = Schema::builtin();
/// let config = Config::new().kdf(KdfParams::new(1_000)?);
///
/// let driver = MigrationDriver::new(&store, &schema, config);
/// let summary = driver.run(&MigrationKeys::new(Secret::parse("passphrase")?))?;
/// assert!(summary.is_success());
/// # Ok::<(), fieldseal_core::CoreError>(())
/// ```
pub struct MigrationDriver<'a> {
    store: &'a dyn DocumentStore,
    schema: &'a Schema,
    config: Config,
    cancel: CancelToken,
    observer: &'a dyn MigrationObserver,
    log: Option<&'a RecordLog>,
}

impl<'a> MigrationDriver<'a> {
    /// Creates a driver over `store` for the collections in `schema`.
    pub fn new(store: &'a dyn DocumentStore, schema: &'a Schema, config: Config) -> Self {
        Self {
            store,
            schema,
            config,
            cancel: CancelToken::new(),
            observer: &NoopObserver,
            log: None,
        }
    }

    /// Uses `token` to stop the run between records.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Reports progress to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn MigrationObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Appends migrated and failed record outcomes to `log` page by page.
    #[must_use]
    pub fn with_record_log(mut self, log: &'a RecordLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Runs the migration.
    ///
    /// Per-record failures are recorded in the summary. A fatal store error
    /// stops the run and is recorded as the summary's abort reason.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if the configuration cannot
    /// drive a run.
    pub fn run(&self, keys: &MigrationKeys) -> CoreResult<RunSummary> {
        let transform = MigrateField {
            cipher: AuthenticatedCipher::new(self.config.kdf),
            legacy: LegacyCipher::new(),
            keys,
        };
        let mut summary = RunSummary::new("migrate", self.config.dry_run);
        summary.key_fingerprint = Some(keys.current().fingerprint());
        self.runner().run(summary, &transform, !self.config.dry_run)
    }

    fn runner(&self) -> Runner<'_> {
        Runner {
            store: self.store,
            schema: self.schema,
            config: &self.config,
            cancel: &self.cancel,
            observer: self.observer,
            log: self.log,
        }
    }
}
