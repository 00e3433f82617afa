//! Rotate command implementation.

use super::output::{cancel_on_ctrl_c, confirmed, finish, print_plan, ConsoleObserver};
use super::{CommandResult, CommandStatus, Settings};
use clap::ValueEnum;
use fieldseal_core::migration::RecordLog;
use fieldseal_core::{KeyRotation, RotationDriver};
use tracing::{info, warn};

/// When the new key is stored under its staging id.
///
/// A generated key is always published before the data pass. `after` and
/// `skip` apply only to a key supplied with `--new-key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PublishOrder {
    /// Before the data pass, so rotated records are always readable.
    Before,
    /// After the data pass, including runs with failed records.
    After,
    /// Never; the operator publishes the key by other means.
    Skip,
}

impl PublishOrder {
    /// Order actually used. Nobody else holds a generated key, so it must
    /// be stored before any record is sealed under it.
    fn effective(self, generated: bool) -> Self {
        if generated {
            Self::Before
        } else {
            self
        }
    }
}

/// Re-encrypts every current envelope from the active key to the new key.
pub fn run(settings: &Settings, dry_run: bool, force: bool, publish: PublishOrder) -> CommandResult {
    let config = settings.config(dry_run)?;
    let schema = settings.schema()?;
    let keys = settings.require_key_provider()?;
    let old = settings.current_key(Some(&keys))?;
    let (new, generated) = settings.new_key(&keys)?;

    let order = publish.effective(generated);
    if order != publish {
        warn!(requested = ?publish, "generated key is published before the data pass");
        println!("Note: a generated key is published before any record is rewritten.");
    }

    let store = settings.open_store()?;
    info!("Rotating keys in {:?}", store.root());

    println!("Rotating keys in {}", store.root().display());
    println!("  Old key: {}", old.fingerprint());
    println!(
        "  New key: {}{} (staging id {})",
        new.fingerprint(),
        if generated { ", generated" } else { "" },
        settings.new_key_id
    );
    print_plan(&schema, &config);

    if !confirmed(force, dry_run, "Re-encrypt every field under the new key?")? {
        println!("Not confirmed. Nothing written.");
        return Ok(CommandStatus::Success);
    }

    let rotation = KeyRotation::new(&keys);
    if order == PublishOrder::Before && !dry_run {
        rotation.publish_new_key(&settings.new_key_id, &new)?;
        println!("✓ New key published as {}", settings.new_key_id);
    }

    let log = RecordLog::create(&settings.log_dir, "rotate")?;
    let observer = ConsoleObserver;
    let summary = RotationDriver::new(&store, &schema, config)
        .with_cancel(cancel_on_ctrl_c())
        .with_observer(&observer)
        .with_record_log(&log)
        .run(&old, &new)?;

    if order == PublishOrder::After && !dry_run {
        rotation.publish_new_key(&settings.new_key_id, &new)?;
        println!("✓ New key published as {}", settings.new_key_id);
    }

    let status = finish(&summary, &settings.log_dir)?;
    if status == CommandStatus::Success && !dry_run {
        println!("Next: run `fieldseal cutover` to make the new key active.");
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use fieldseal_core::crypto::AuthenticatedCipher;
    use fieldseal_core::Secret;
    use fieldseal_storage::{Document, DocumentStore, FileStore};
    use std::path::Path;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    struct Workspace {
        store: TempDir,
        secrets: TempDir,
        logs: TempDir,
        active: Secret,
    }

    impl Workspace {
        fn new() -> Self {
            let workspace = Self {
                store: tempfile::tempdir().unwrap(),
                secrets: tempfile::tempdir().unwrap(),
                logs: tempfile::tempdir().unwrap(),
                active: Secret::parse("active-passphrase").unwrap(),
            };
            let sealed = AuthenticatedCipher::default()
                .encrypt("JBSWY3DPEHPK3PXP", &workspace.active)
                .unwrap();
            let store = FileStore::open(workspace.store.path(), true).unwrap();
            store
                .insert("users", Document::new("u1").with_field("twofa_secret", sealed))
                .unwrap();
            drop(store);
            std::fs::write(workspace.secrets.path().join("fieldseal.active"), "active-passphrase")
                .unwrap();
            workspace
        }

        fn settings(&self, extra: &[&str]) -> Settings {
            let mut argv = vec![
                "fieldseal",
                "--store-dir",
                path(self.store.path()),
                "--secrets-dir",
                path(self.secrets.path()),
                "--log-dir",
                path(self.logs.path()),
            ];
            argv.extend_from_slice(extra);
            Harness::parse_from(argv).settings
        }

        fn stored(&self) -> String {
            let store = FileStore::open(self.store.path(), false).unwrap();
            let document = store.get("users", "u1").unwrap().unwrap();
            document.str_field("twofa_secret").unwrap().to_string()
        }
    }

    fn path(p: &Path) -> &str {
        p.to_str().unwrap()
    }

    #[test]
    fn generated_key_is_published_even_when_after_requested() {
        let workspace = Workspace::new();
        let settings = workspace.settings(&[]);

        let status = run(&settings, false, true, PublishOrder::After).unwrap();
        assert_eq!(status, CommandStatus::Success);

        let keys = settings.require_key_provider().unwrap();
        let staged = keys.get("fieldseal.next").unwrap();
        let opened = AuthenticatedCipher::default()
            .decrypt(&workspace.stored(), &staged)
            .unwrap();
        assert_eq!(opened.as_str(), "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn failed_publish_of_generated_key_leaves_records_untouched() {
        let workspace = Workspace::new();
        // The temp file the secret store writes through cannot be created.
        std::fs::create_dir(workspace.secrets.path().join(".fieldseal.next.tmp")).unwrap();
        let settings = workspace.settings(&[]);

        assert!(run(&settings, false, true, PublishOrder::After).is_err());

        let opened = AuthenticatedCipher::default()
            .decrypt(&workspace.stored(), &workspace.active)
            .unwrap();
        assert_eq!(opened.as_str(), "JBSWY3DPEHPK3PXP");
        let keys = settings.require_key_provider().unwrap();
        assert!(!keys.contains("fieldseal.next").unwrap());
    }

    #[test]
    fn supplied_key_honours_skip() {
        let workspace = Workspace::new();
        let settings = workspace.settings(&["--new-key", "operator-held"]);

        let status = run(&settings, false, true, PublishOrder::Skip).unwrap();
        assert_eq!(status, CommandStatus::Success);

        let keys = settings.require_key_provider().unwrap();
        assert!(!keys.contains("fieldseal.next").unwrap());
        let opened = AuthenticatedCipher::default()
            .decrypt(&workspace.stored(), &Secret::parse("operator-held").unwrap())
            .unwrap();
        assert_eq!(opened.as_str(), "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn effective_order() {
        assert_eq!(PublishOrder::After.effective(true), PublishOrder::Before);
        assert_eq!(PublishOrder::Skip.effective(true), PublishOrder::Before);
        assert_eq!(PublishOrder::After.effective(false), PublishOrder::After);
        assert_eq!(PublishOrder::Skip.effective(false), PublishOrder::Skip);
    }
}
