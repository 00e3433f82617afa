//! Current to current re-encryption under a new key, and the key lifecycle
//! around it.
//!
//! A rotation goes through these steps:
//!
//! 1. [`KeyRotation::publish_new_key`] stores the new key under a staging id
//!    (before or after the data pass)
//! 2. [`RotationDriver::run`] re-encrypts every field from the old key to the
//!    new one; fields already under the new key are left alone
//! 3. [`RotationDriver::verify_under`] checks every field reads under the new
//!    key without writing anything
//! 4. [`KeyRotation::cutover`] switches the active key once the operator
//!    confirms; the old key is archived, never deleted

use super::report::{RecordLog, RunSummary};
use super::runner::{seal_verified, FieldAction, FieldRef, FieldTransform, Runner};
use super::{CancelToken, MigrationObserver, NoopObserver};
use crate::config::Config;
use crate::crypto::{AuthenticatedCipher, Format};
use crate::error::{CoreError, CoreResult};
use crate::keys::{KeyProvider, Secret};
use crate::schema::Schema;
use chrono::Utc;
use fieldseal_storage::DocumentStore;
use tracing::info;

struct RotateField<'a> {
    cipher: AuthenticatedCipher,
    old: &'a Secret,
    new: &'a Secret,
}

impl FieldTransform for RotateField<'_> {
    fn apply(&self, field: &FieldRef<'_>, value: &str) -> CoreResult<FieldAction> {
        match field.format {
            Format::Legacy => Err(CoreError::invalid_operation(
                "value is still in the legacy format, run migrate first",
            )),
            Format::Unrecognized => Err(CoreError::malformed(
                "value is neither a legacy value nor a current envelope",
            )),
            Format::Current => match self.cipher.decrypt(value, self.old) {
                Ok(plaintext) => Ok(FieldAction::Replace(seal_verified(
                    &self.cipher,
                    &plaintext,
                    self.new,
                    field,
                )?)),
                Err(CoreError::AuthenticationFailure) => {
                    // Written by an earlier, interrupted rotation run.
                    self.cipher
                        .decrypt(value, self.new)
                        .map(|_| FieldAction::Keep)
                }
                Err(e) => Err(e),
            },
        }
    }
}

struct VerifyField<'a> {
    cipher: AuthenticatedCipher,
    key: &'a Secret,
}

impl FieldTransform for VerifyField<'_> {
    fn apply(&self, field: &FieldRef<'_>, value: &str) -> CoreResult<FieldAction> {
        match field.format {
            Format::Current => self.cipher.decrypt(value, self.key).map(|_| FieldAction::Keep),
            Format::Legacy => Err(CoreError::invalid_operation(
                "value is still in the legacy format",
            )),
            Format::Unrecognized => Err(CoreError::malformed(
                "value is neither a legacy value nor a current envelope",
            )),
        }
    }
}

/// Re-encrypts current envelopes from an old key to a new key.
pub struct RotationDriver<'a> {
    store: &'a dyn DocumentStore,
    schema: &'a Schema,
    config: Config,
    cancel: CancelToken,
    observer: &'a dyn MigrationObserver,
    log: Option<&'a RecordLog>,
}

impl<'a> RotationDriver<'a> {
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

    /// Re-encrypts every field from `old` to `new`.
    ///
    /// Re-running after an interruption is safe: fields that already
    /// decrypt under `new` are counted as already current.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if `old` and `new` are the same
    /// key or the configuration cannot drive a run.
    pub fn run(&self, old: &Secret, new: &Secret) -> CoreResult<RunSummary> {
        if old == new {
            return Err(CoreError::configuration(
                "old and new keys are identical, nothing to rotate",
            ));
        }
        let transform = RotateField {
            cipher: AuthenticatedCipher::new(self.config.kdf),
            old,
            new,
        };
        let mut summary = RunSummary::new("rotate", self.config.dry_run);
        summary.key_fingerprint = Some(new.fingerprint());
        self.runner().run(summary, &transform, !self.config.dry_run)
    }

    /// Checks, without writing, that every field is a current envelope that
    /// decrypts under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if the configuration cannot
    /// drive a run.
    pub fn verify_under(&self, key: &Secret) -> CoreResult<RunSummary> {
        let transform = VerifyField {
            cipher: AuthenticatedCipher::new(self.config.kdf),
            key,
        };
        let mut summary = RunSummary::new("verify", false);
        summary.key_fingerprint = Some(key.fingerprint());
        self.runner().run(summary, &transform, false)
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

/// Result of a successful cutover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoverReceipt {
    /// Id the previous active key was archived under, `None` if the staged
    /// key was already active.
    pub archived_as: Option<String>,
    /// Fingerprint of the key now active.
    pub active_fingerprint: String,
}

/// Key publishing and the operator cutover gate.
#[derive(Debug)]
pub struct KeyRotation<'a> {
    keys: &'a KeyProvider,
}

impl<'a> KeyRotation<'a> {
    /// Creates lifecycle operations over `keys`.
    #[must_use]
    pub const fn new(keys: &'a KeyProvider) -> Self {
        Self { keys }
    }

    /// Stores `secret` under the staging id `staging_id`.
    ///
    /// Publishing the same key twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `staging_id` already holds
    /// a different key.
    pub fn publish_new_key(&self, staging_id: &str, secret: &Secret) -> CoreResult<()> {
        self.keys.invalidate(staging_id);
        match self.keys.get(staging_id) {
            Ok(existing) if existing == *secret => {
                info!(id = staging_id, "new key already published");
                return Ok(());
            }
            Ok(_) => {
                return Err(CoreError::invalid_operation(format!(
                    "{staging_id} already holds a different key, refusing to overwrite"
                )));
            }
            Err(CoreError::SecretNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        self.keys.publish(staging_id, secret)
    }

    /// Makes the staged key active.
    ///
    /// Requires `confirmed` and a verification summary, produced under the
    /// staged key, with no failures and no legacy fields. The previous
    /// active key is archived as `<active_id>.retired.<unix-seconds>`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::CutoverRefused`] if a precondition does not hold
    /// - [`CoreError::SecretNotFound`] if either key is missing
    pub fn cutover(
        &self,
        active_id: &str,
        staging_id: &str,
        verification: &RunSummary,
        confirmed: bool,
    ) -> CoreResult<CutoverReceipt> {
        if !confirmed {
            return Err(CoreError::cutover_refused("operator confirmation required"));
        }
        if verification.command != "verify" {
            return Err(CoreError::cutover_refused(format!(
                "expected a verification summary, got {:?}",
                verification.command
            )));
        }
        if !verification.is_success() {
            return Err(CoreError::cutover_refused(format!(
                "verification did not pass: {} failed record(s)",
                verification.failed
            )));
        }
        if verification.legacy_fields > 0 {
            return Err(CoreError::cutover_refused(format!(
                "{} legacy field(s) remain",
                verification.legacy_fields
            )));
        }

        self.keys.invalidate(active_id);
        self.keys.invalidate(staging_id);
        let staged = self.keys.get(staging_id)?;
        if verification.key_fingerprint.as_deref() != Some(staged.fingerprint().as_str()) {
            return Err(CoreError::cutover_refused(
                "verification was not run under the staged key",
            ));
        }

        let active = self.keys.get(active_id)?;
        if active == staged {
            info!(id = active_id, "staged key is already active");
            return Ok(CutoverReceipt {
                archived_as: None,
                active_fingerprint: staged.fingerprint(),
            });
        }

        let archive_id = format!("{active_id}.retired.{}", Utc::now().timestamp());
        self.keys.publish(&archive_id, &active)?;
        self.keys.publish(active_id, &staged)?;
        info!(
            active = active_id,
            archived = %archive_id,
            fingerprint = %staged.fingerprint(),
            "cutover complete"
        );

        Ok(CutoverReceipt {
            archived_as: Some(archive_id),
            active_fingerprint: staged.fingerprint(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KdfParams, LegacyCipher, MIN_ITERATIONS};
    use fieldseal_storage::{Document, InMemorySecretStore, InMemoryStore, SecretStore};
    use std::sync::Arc;

    fn config() -> Config {
        Config::new().kdf(KdfParams::new(MIN_ITERATIONS).unwrap())
    }

    fn cipher() -> AuthenticatedCipher {
        AuthenticatedCipher::new(KdfParams::new(MIN_ITERATIONS).unwrap())
    }

    fn secret(s: &str) -> Secret {
        Secret::parse(s).unwrap()
    }

    fn key_field(store: &InMemoryStore, id: &str) -> String {
        store
            .get("masternodes", id)
            .unwrap()
            .unwrap()
            .str_field("private_key")
            .unwrap()
            .to_string()
    }

    fn seeded(old: &Secret, count: usize) -> InMemoryStore {
        let store = InMemoryStore::new();
        for i in 0..count {
            let value = cipher().encrypt(&format!("PRIV{i}"), old).unwrap();
            store
                .insert("masternodes", Document::new(format!("mn{i}")).with_field("private_key", value))
                .unwrap();
        }
        store
    }

    fn schema() -> Schema {
        Schema::builtin().restrict(&["masternodes"]).unwrap()
    }

    #[test]
    fn rotates_and_verifies() {
        let (old, new) = (secret("old"), secret("new"));
        let store = seeded(&old, 4);
        let schema = schema();
        let driver = RotationDriver::new(&store, &schema, config());

        let summary = driver.run(&old, &new).unwrap();
        assert_eq!(summary.migrated, 4);
        assert!(summary.is_success());
        assert_eq!(cipher().decrypt(&key_field(&store, "mn2"), &new).unwrap().as_str(), "PRIV2");

        let verified = driver.verify_under(&new).unwrap();
        assert!(verified.is_success());
        assert_eq!(verified.current_fields, 4);
        assert!(!driver.verify_under(&old).unwrap().is_success());
    }

    #[test]
    fn rerun_after_partial_rotation_is_idempotent() {
        let (old, new) = (secret("old"), secret("new"));
        let store = seeded(&old, 3);
        // mn1 was rotated by an earlier interrupted run.
        let rotated = cipher().encrypt("PRIV1", &new).unwrap();
        store.put("masternodes", Document::new("mn1").with_field("private_key", rotated.clone()));

        let schema = schema();
        let driver = RotationDriver::new(&store, &schema, config());
        let first = driver.run(&old, &new).unwrap();
        assert_eq!((first.migrated, first.already_current), (2, 1));
        assert_eq!(key_field(&store, "mn1"), rotated);

        let writes = store.write_count();
        let second = driver.run(&old, &new).unwrap();
        assert_eq!((second.migrated, second.already_current), (0, 3));
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn unknown_key_and_legacy_fail() {
        let (old, new) = (secret("old"), secret("new"));
        let store = seeded(&old, 1);
        let foreign = cipher().encrypt("X", &secret("third")).unwrap();
        store
            .insert("masternodes", Document::new("mnx").with_field("private_key", foreign))
            .unwrap();
        let legacy = LegacyCipher::new().encrypt("L", &old).unwrap();
        store
            .insert("masternodes", Document::new("mnl").with_field("private_key", legacy))
            .unwrap();

        let schema = schema();
        let summary = RotationDriver::new(&store, &schema, config()).run(&old, &new).unwrap();
        assert_eq!(summary.migrated, 1);
        assert_eq!(summary.failed, 2);
        let legacy_failure = summary.failures.iter().find(|f| f.record_id == "mnl").unwrap();
        assert!(legacy_failure.error.contains("run migrate first"));
        let foreign_failure = summary.failures.iter().find(|f| f.record_id == "mnx").unwrap();
        assert!(foreign_failure.error.contains("authentication failed"));
    }

    #[test]
    fn identical_keys_rejected() {
        let store = InMemoryStore::new();
        let schema = schema();
        let result = RotationDriver::new(&store, &schema, config()).run(&secret("a"), &secret("a"));
        assert!(matches!(result, Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn rotation_dry_run_writes_nothing() {
        let (old, new) = (secret("old"), secret("new"));
        let store = seeded(&old, 2);
        let schema = schema();
        let summary = RotationDriver::new(&store, &schema, config().dry_run(true))
            .run(&old, &new)
            .unwrap();
        assert_eq!(summary.migrated, 2);
        assert_eq!(store.write_count(), 0);
    }

    fn provider() -> (Arc<InMemorySecretStore>, KeyProvider) {
        let store = Arc::new(InMemorySecretStore::new());
        let provider = KeyProvider::new(store.clone());
        (store, provider)
    }

    #[test]
    fn publish_refuses_to_overwrite() {
        let (_, keys) = provider();
        let rotation = KeyRotation::new(&keys);
        rotation.publish_new_key("key.next", &secret("one")).unwrap();
        rotation.publish_new_key("key.next", &secret("one")).unwrap();
        assert!(matches!(
            rotation.publish_new_key("key.next", &secret("two")),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert_eq!(keys.get("key.next").unwrap(), secret("one"));
    }

    fn passing_verification(key: &Secret) -> RunSummary {
        let mut summary = RunSummary::new("verify", false);
        summary.key_fingerprint = Some(key.fingerprint());
        summary.finish();
        summary
    }

    #[test]
    fn cutover_archives_and_switches() {
        let (store, keys) = provider();
        store.put("key.active", b"old").unwrap();
        store.put("key.next", b"new").unwrap();
        let rotation = KeyRotation::new(&keys);

        let receipt = rotation
            .cutover("key.active", "key.next", &passing_verification(&secret("new")), true)
            .unwrap();

        let archived = receipt.archived_as.unwrap();
        assert!(archived.starts_with("key.active.retired."));
        assert_eq!(keys.get(&archived).unwrap(), secret("old"));
        assert_eq!(keys.get("key.active").unwrap(), secret("new"));
        assert_eq!(receipt.active_fingerprint, secret("new").fingerprint());

        let again = rotation
            .cutover("key.active", "key.next", &passing_verification(&secret("new")), true)
            .unwrap();
        assert_eq!(again.archived_as, None);
    }

    #[test]
    fn cutover_refusals() {
        let (store, keys) = provider();
        store.put("key.active", b"old").unwrap();
        store.put("key.next", b"new").unwrap();
        let rotation = KeyRotation::new(&keys);
        let good = passing_verification(&secret("new"));

        let refused = |result: CoreResult<CutoverReceipt>| {
            matches!(result, Err(CoreError::CutoverRefused { .. }))
        };

        assert!(refused(rotation.cutover("key.active", "key.next", &good, false)));

        let mut failed = good.clone();
        failed.failed = 1;
        assert!(refused(rotation.cutover("key.active", "key.next", &failed, true)));

        let mut legacy = good.clone();
        legacy.legacy_fields = 2;
        assert!(refused(rotation.cutover("key.active", "key.next", &legacy, true)));

        let wrong_key = passing_verification(&secret("old"));
        assert!(refused(rotation.cutover("key.active", "key.next", &wrong_key, true)));

        let mut not_verify = good.clone();
        not_verify.command = "rotate".into();
        assert!(refused(rotation.cutover("key.active", "key.next", &not_verify, true)));

        assert_eq!(keys.get("key.active").unwrap(), secret("old"));
        assert_eq!(store.ids().len(), 2);
    }

    #[test]
    fn cutover_after_real_verification() {
        let (old, new) = (secret("old"), secret("new"));
        let documents = seeded(&old, 2);
        let schema = schema();
        let driver = RotationDriver::new(&documents, &schema, config());

        let (_, keys) = provider();
        keys.publish("key.active", &old).unwrap();
        let rotation = KeyRotation::new(&keys);
        rotation.publish_new_key("key.next", &new).unwrap();

        driver.run(&old, &new).unwrap();
        let verification = driver.verify_under(&new).unwrap();
        rotation.cutover("key.active", "key.next", &verification, true).unwrap();
        assert_eq!(keys.get("key.active").unwrap(), new);
    }
}
