//! Migrate command implementation.

use super::output::{cancel_on_ctrl_c, confirmed, finish, print_plan, ConsoleObserver};
use super::{CommandResult, CommandStatus, Settings};
use fieldseal_core::migration::RecordLog;
use fieldseal_core::{MigrationDriver, MigrationKeys};
use tracing::info;

/// Re-encrypts every legacy field under the current key.
pub fn run(settings: &Settings, dry_run: bool, force: bool) -> CommandResult {
    let config = settings.config(dry_run)?;
    let schema = settings.schema()?;
    let provider = settings.key_provider()?;
    let current = settings.current_key(provider.as_ref())?;

    let mut keys = MigrationKeys::new(current);
    for legacy in settings.legacy_keys()? {
        keys = keys.legacy_key(legacy);
    }

    let store = settings.open_store()?;
    info!("Migrating legacy fields in {:?}", store.root());

    println!("Migrating legacy fields in {}", store.root().display());
    println!("  Current key: {}", keys.current().fingerprint());
    print_plan(&schema, &config);

    if !confirmed(force, dry_run, "Re-encrypt legacy fields now?")? {
        println!("Not confirmed. Nothing written.");
        return Ok(CommandStatus::Success);
    }

    let log = RecordLog::create(&settings.log_dir, "migrate")?;
    let observer = ConsoleObserver;
    let summary = MigrationDriver::new(&store, &schema, config)
        .with_cancel(cancel_on_ctrl_c())
        .with_observer(&observer)
        .with_record_log(&log)
        .run(&keys)?;

    finish(&summary, &settings.log_dir)
}
