//! Cutover command implementation.

use super::output::{ask, cancel_on_ctrl_c, finish, ConsoleObserver};
use super::{CommandResult, CommandStatus, Settings};
use fieldseal_core::migration::RecordLog;
use fieldseal_core::{KeyRotation, RotationDriver};
use tracing::info;

/// Verifies every field under the staged key, then makes it active.
pub fn run(settings: &Settings, force: bool) -> CommandResult {
    if !settings.collections.is_empty() {
        return Err("cutover verifies every collection; drop --collection".into());
    }
    let config = settings.config(false)?;
    let schema = settings.schema()?;
    let keys = settings.require_key_provider()?;
    let staged = keys.get(&settings.new_key_id)?;
    let store = settings.open_store()?;

    info!("Verifying {:?} before cutover", store.root());
    println!(
        "Verifying every field under staged key {} ({})",
        settings.new_key_id,
        staged.fingerprint()
    );

    let log = RecordLog::create(&settings.log_dir, "cutover")?;
    let observer = ConsoleObserver;
    let verification = RotationDriver::new(&store, &schema, config)
        .with_cancel(cancel_on_ctrl_c())
        .with_observer(&observer)
        .with_record_log(&log)
        .verify_under(&staged)?;

    let status = finish(&verification, &settings.log_dir)?;
    if status != CommandStatus::Success {
        println!("✗ Cutover refused: verification did not pass");
        return Ok(status);
    }

    let question = format!(
        "Make {} the active key {}?",
        settings.new_key_id, settings.key_id
    );
    let confirmed = force || ask(&question)?;
    if !confirmed {
        println!("Not confirmed. Active key unchanged.");
        return Ok(CommandStatus::Success);
    }

    let receipt = KeyRotation::new(&keys).cutover(
        &settings.key_id,
        &settings.new_key_id,
        &verification,
        confirmed,
    )?;
    match &receipt.archived_as {
        Some(archive) => println!("✓ Previous key archived as {archive}"),
        None => println!("✓ Staged key was already active"),
    }
    println!(
        "✓ {} is now {}",
        settings.key_id, receipt.active_fingerprint
    );
    Ok(CommandStatus::Success)
}
