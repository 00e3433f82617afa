//! Cross-crate integration test helpers.
//!
//! Provides a harness that seeds encrypted fields, remembers the plaintext
//! behind each one, and checks after a run that nothing was lost.

use crate::fixtures::{current_value, fast_cipher, legacy_value, Seed, TestKeys};
use fieldseal_core::crypto::{classify, Format};
use fieldseal_core::Secret;
use fieldseal_storage::{Document, DocumentStore, FileStore, InMemoryStore};
use std::collections::{BTreeMap, HashMap};
use tempfile::TempDir;

/// A test harness for end-to-end runs.
pub struct SealHarness {
    /// The document store.
    pub store: Box<dyn DocumentStore>,
    /// The key store.
    pub keys: TestKeys,
    /// Plaintext behind every seeded field, by (collection, id, field).
    plaintexts: BTreeMap<(String, String, String), String>,
    _dir: Option<TempDir>,
}

impl SealHarness {
    /// Creates a harness over in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            store: Box::new(InMemoryStore::new()),
            keys: TestKeys::memory(),
            plaintexts: BTreeMap::new(),
            _dir: None,
        }
    }

    /// Creates a harness over a file store and a secrets directory.
    pub fn on_disk() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(&dir.path().join("store"), true).expect("open file store");
        Self {
            store: Box::new(store),
            keys: TestKeys::file(),
            plaintexts: BTreeMap::new(),
            _dir: Some(dir),
        }
    }

    /// Inserts a record with one encrypted field and tracks its plaintext.
    ///
    /// Only [`Seed::Legacy`] and [`Seed::Current`] are tracked; other seeds
    /// store garbage or null.
    pub fn insert(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
        plaintext: &str,
        seed: Seed,
        key: &Secret,
    ) {
        let value = match seed {
            Seed::Legacy => legacy_value(plaintext, key).into(),
            Seed::Current => current_value(plaintext, key).into(),
            Seed::Corrupt => format!("corrupt-{id}").into(),
            Seed::Null => serde_json::Value::Null,
        };
        self.store
            .insert(collection, Document::new(id).with_field(field, value))
            .expect("Failed to insert document");
        if matches!(seed, Seed::Legacy | Seed::Current) {
            self.plaintexts.insert(
                (collection.to_string(), id.to_string(), field.to_string()),
                plaintext.to_string(),
            );
        }
    }

    /// Returns the stored text of a field.
    pub fn value(&self, collection: &str, id: &str, field: &str) -> Option<String> {
        self.store
            .get(collection, id)
            .expect("Failed to get document")
            .and_then(|doc| doc.str_field(field).map(str::to_string))
    }

    /// Number of tracked fields.
    pub fn tracked(&self) -> usize {
        self.plaintexts.len()
    }

    /// Asserts every tracked field is a current envelope that opens under
    /// `key` to its original plaintext.
    pub fn verify_all_under(&self, key: &Secret) {
        let cipher = fast_cipher();
        for ((collection, id, field), expected) in &self.plaintexts {
            let stored = self
                .value(collection, id, field)
                .unwrap_or_else(|| panic!("{collection}/{id}.{field} disappeared"));
            assert_eq!(
                classify(&stored),
                Format::Current,
                "{collection}/{id}.{field} is not a current envelope"
            );
            let plaintext = cipher
                .decrypt(&stored, key)
                .unwrap_or_else(|e| panic!("{collection}/{id}.{field}: {e}"));
            assert_eq!(
                plaintext.as_str(),
                expected,
                "plaintext mismatch for {collection}/{id}.{field}"
            );
        }
    }

    /// Returns how many tracked fields are in each format.
    pub fn format_counts(&self) -> HashMap<Format, usize> {
        let mut counts = HashMap::new();
        for (collection, id, field) in self.plaintexts.keys() {
            if let Some(stored) = self.value(collection, id, field) {
                *counts.entry(classify(&stored)).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{fast_config, secret, FlakyStore, InterferingStore};
    use fieldseal_core::{
        CancelToken, KeyRotation, MigrationDriver, MigrationKeys, RotationDriver, Schema,
    };

    const ACTIVE: &str = "fieldseal.active";
    const STAGED: &str = "fieldseal.next";

    fn seed_mixed(harness: &mut SealHarness, legacy: &Secret, current: &Secret) {
        for i in 0..12 {
            let (seed, key) = if i % 3 == 0 {
                (Seed::Current, current)
            } else {
                (Seed::Legacy, legacy)
            };
            harness.insert(
                "users",
                &format!("user-{i:02}"),
                "twofa_secret",
                &format!("JBSWY3DPEHPK3P{i:02}"),
                seed,
                key,
            );
        }
        for i in 0..4 {
            harness.insert(
                "masternodes",
                &format!("mn-{i}"),
                "private_key",
                &format!("7r{i}Zx9QpLmKeyMaterial"),
                Seed::Legacy,
                legacy,
            );
        }
    }

    #[test]
    fn full_lifecycle_on_disk() {
        let mut harness = SealHarness::on_disk();
        let schema = Schema::builtin();
        let legacy = secret("old-deployment-passphrase");
        let k1 = secret("first-current-key");
        let k2 = secret("second-current-key");
        harness.keys.publish(ACTIVE, &k1).unwrap();
        seed_mixed(&mut harness, &legacy, &k1);

        // Legacy to current.
        let keys = MigrationKeys::new(k1.clone()).legacy_key(legacy);
        let migrated = MigrationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .run(&keys)
            .unwrap();
        assert!(migrated.is_success());
        assert_eq!(migrated.migrated, 12);
        assert_eq!(migrated.already_current, 4);
        harness.verify_all_under(&k1);

        // Current to current.
        let rotation = KeyRotation::new(&harness.keys);
        rotation.publish_new_key(STAGED, &k2).unwrap();
        let rotated = RotationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .run(&k1, &k2)
            .unwrap();
        assert!(rotated.is_success());
        assert_eq!(rotated.migrated, harness.tracked());
        harness.verify_all_under(&k2);

        // Verify, then switch.
        let verification = RotationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .verify_under(&k2)
            .unwrap();
        assert!(verification.is_success());
        let receipt = rotation
            .cutover(ACTIVE, STAGED, &verification, true)
            .unwrap();

        assert_eq!(harness.keys.get(ACTIVE).unwrap(), k2);
        let archived = receipt.archived_as.expect("old key archived");
        assert_eq!(harness.keys.get(&archived).unwrap(), k1);
        assert_eq!(receipt.active_fingerprint, k2.fingerprint());
    }

    #[test]
    fn migration_twice_is_noop() {
        let mut harness = SealHarness::in_memory();
        let schema = Schema::builtin();
        let legacy = secret("legacy");
        let current = secret("current");
        seed_mixed(&mut harness, &legacy, &current);
        let keys = MigrationKeys::new(current.clone()).legacy_key(legacy);

        let first = MigrationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .run(&keys)
            .unwrap();
        assert!(!first.is_noop());
        let snapshot: Vec<_> = (0..12)
            .map(|i| harness.value("users", &format!("user-{i:02}"), "twofa_secret"))
            .collect();

        let second = MigrationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .run(&keys)
            .unwrap();
        assert!(second.is_noop());
        assert_eq!(second.legacy_fields, 0);
        let after: Vec<_> = (0..12)
            .map(|i| harness.value("users", &format!("user-{i:02}"), "twofa_secret"))
            .collect();
        assert_eq!(snapshot, after);
        harness.verify_all_under(&current);
    }

    #[test]
    fn corrupt_records_do_not_stop_the_run() {
        let mut harness = SealHarness::in_memory();
        let schema = Schema::builtin();
        let legacy = secret("legacy");
        let current = secret("current");
        seed_mixed(&mut harness, &legacy, &current);
        harness.insert("users", "user-bad", "twofa_secret", "", Seed::Corrupt, &legacy);
        harness.insert("users", "user-null", "twofa_secret", "", Seed::Null, &legacy);

        let keys = MigrationKeys::new(current.clone()).legacy_key(legacy);
        let summary = MigrationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .run(&keys)
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].record_id, "user-bad");
        assert_eq!(summary.unrecognized_fields, 1);
        assert!(!summary.is_success());
        harness.verify_all_under(&current);
        assert_eq!(
            harness.value("users", "user-bad", "twofa_secret").as_deref(),
            Some("corrupt-user-bad")
        );
    }

    #[test]
    fn workers_agree_with_single_thread() {
        let legacy = secret("legacy");
        let current = secret("current");
        let schema = Schema::builtin();
        let keys = MigrationKeys::new(current.clone()).legacy_key(legacy.clone());

        let mut serial = SealHarness::in_memory();
        seed_mixed(&mut serial, &legacy, &current);
        let one = MigrationDriver::new(serial.store.as_ref(), &schema, fast_config().batch_size(3))
            .run(&keys)
            .unwrap();

        let mut parallel = SealHarness::in_memory();
        seed_mixed(&mut parallel, &legacy, &current);
        let many = MigrationDriver::new(
            parallel.store.as_ref(),
            &schema,
            fast_config().batch_size(3).workers(4),
        )
        .run(&keys)
        .unwrap();

        assert_eq!(one.migrated, many.migrated);
        assert_eq!(one.already_current, many.already_current);
        assert_eq!(one.records_scanned, many.records_scanned);
        parallel.verify_all_under(&current);
        assert_eq!(parallel.format_counts().get(&Format::Legacy), None);
    }

    #[test]
    fn cancelled_run_can_be_resumed() {
        let mut harness = SealHarness::in_memory();
        let schema = Schema::builtin();
        let legacy = secret("legacy");
        let current = secret("current");
        seed_mixed(&mut harness, &legacy, &current);
        let keys = MigrationKeys::new(current.clone()).legacy_key(legacy);

        let token = CancelToken::new();
        token.cancel();
        let stopped = MigrationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .with_cancel(token)
            .run(&keys)
            .unwrap();
        assert!(stopped.interrupted);
        assert!(!stopped.is_success());

        let resumed = MigrationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .run(&keys)
            .unwrap();
        assert!(resumed.is_success());
        harness.verify_all_under(&current);
    }

    #[test]
    fn rotation_resumes_after_partial_run() {
        let mut harness = SealHarness::in_memory();
        let schema = Schema::builtin();
        let k1 = secret("k1");
        let k2 = secret("k2");
        for i in 0..6 {
            harness.insert(
                "voting_addresses",
                &format!("va-{i}"),
                "private_key",
                &format!("voting-key-{i}"),
                Seed::Current,
                if i < 3 { &k2 } else { &k1 },
            );
        }

        let summary = RotationDriver::new(harness.store.as_ref(), &schema, fast_config())
            .run(&k1, &k2)
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.migrated, 3);
        assert_eq!(summary.already_current, 3);
        harness.verify_all_under(&k2);
    }

    #[test]
    fn concurrent_edit_fails_only_that_record() {
        let legacy = secret("legacy");
        let current = secret("current");
        let inner = InMemoryStore::new();
        for id in ["a", "b", "c"] {
            inner
                .insert(
                    "users",
                    Document::new(id).with_field("twofa_secret", legacy_value("SEED", &legacy)),
                )
                .unwrap();
        }
        let store = InterferingStore::new(inner, &["b"]);
        let schema = Schema::builtin();
        let keys = MigrationKeys::new(current).legacy_key(legacy);

        let summary = MigrationDriver::new(&store, &schema, fast_config())
            .run(&keys)
            .unwrap();

        assert_eq!(summary.migrated, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.abort_reason.is_none());
        assert_eq!(summary.failures[0].record_id, "b");
        assert_eq!(
            store.inner.get("users", "b").unwrap().unwrap().str_field("twofa_secret"),
            Some("edited-concurrently")
        );
    }

    #[test]
    fn lost_store_aborts_the_run() {
        let legacy = secret("legacy");
        let current = secret("current");
        let inner = InMemoryStore::new();
        for i in 0..5 {
            inner
                .insert(
                    "users",
                    Document::new(format!("u{i}"))
                        .with_field("twofa_secret", legacy_value("SEED", &legacy)),
                )
                .unwrap();
        }
        let store = FlakyStore::new(inner, 2);
        let schema = Schema::builtin();
        let keys = MigrationKeys::new(current).legacy_key(legacy);

        let summary = MigrationDriver::new(&store, &schema, fast_config())
            .run(&keys)
            .unwrap();

        assert!(summary.abort_reason.is_some());
        assert_eq!(summary.migrated, 2);
        assert!(summary.records_scanned < 5);
        assert!(!summary.is_success());
    }
}
