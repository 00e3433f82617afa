//! Verify command implementation.

use super::output::{cancel_on_ctrl_c, finish, ConsoleObserver};
use super::{CommandResult, Settings};
use fieldseal_core::migration::RecordLog;
use fieldseal_core::RotationDriver;
use tracing::info;

/// Checks, without writing, that every field reads under the active key.
pub fn run(settings: &Settings) -> CommandResult {
    let config = settings.config(false)?;
    let schema = settings.schema()?;
    let provider = settings.key_provider()?;
    let key = settings.current_key(provider.as_ref())?;
    let store = settings.open_store()?;

    info!("Verifying {:?}", store.root());
    println!(
        "Verifying every field in {} under key {}",
        store.root().display(),
        key.fingerprint()
    );

    let log = RecordLog::create(&settings.log_dir, "verify")?;
    let observer = ConsoleObserver;
    let summary = RotationDriver::new(&store, &schema, config)
        .with_cancel(cancel_on_ctrl_c())
        .with_observer(&observer)
        .with_record_log(&log)
        .verify_under(&key)?;

    finish(&summary, &settings.log_dir)
}
