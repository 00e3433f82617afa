//! Console progress, confirmation, reports and Ctrl-C handling.

use super::{CommandResult, CommandStatus};
use fieldseal_core::migration::RecordOutcome;
use fieldseal_core::{CancelToken, Config, MigrationObserver, RunSummary, Schema};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

/// Prints failed records as they happen and a line per scanned page.
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl MigrationObserver for ConsoleObserver {
    fn on_record(&self, outcome: &RecordOutcome) {
        if let Some(error) = &outcome.error {
            println!("  ✗ {}/{}: {}", outcome.collection, outcome.record_id, error);
        }
    }

    fn on_page(&self, collection: &str, documents: usize) {
        if documents > 0 {
            println!("  {collection}: {documents} record(s) processed");
        }
    }
}

/// Prints what a run will touch.
pub fn print_plan(schema: &Schema, config: &Config) {
    println!("Collections:");
    for collection in schema.collections() {
        let fields: Vec<_> = collection.field_names().collect();
        println!("  {}: {}", collection.name, fields.join(", "));
    }
    println!(
        "Batch size {}, {} worker(s), {} KDF iterations{}",
        config.batch_size,
        config.workers,
        config.kdf.iterations(),
        if config.dry_run { ", dry run" } else { "" }
    );
    println!();
}

/// Asks the operator to type `yes`. Skipped for `--force` and dry runs.
pub fn confirmed(force: bool, dry_run: bool, question: &str) -> io::Result<bool> {
    if force || dry_run {
        return Ok(true);
    }
    ask(question)
}

/// Asks the operator to type `yes`.
pub fn ask(question: &str) -> io::Result<bool> {
    print!("{question} Type 'yes' to continue: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    answer.trim() == "yes"
}

/// Prints the summary, writes the JSON report and maps the run to a status.
pub fn finish(summary: &RunSummary, log_dir: &Path) -> CommandResult {
    println!();
    println!("Summary ({})", summary.command);
    println!("==================");
    println!("  Records scanned:   {}", summary.records_scanned);
    println!("  Fields scanned:    {}", summary.fields_scanned);
    println!("  Legacy fields:     {}", summary.legacy_fields);
    println!("  Already current:   {}", summary.already_current);
    println!(
        "  Migrated:          {}{}",
        summary.migrated,
        if summary.dry_run { " (dry run, not written)" } else { "" }
    );
    println!("  Failed:            {}", summary.failed);

    let path = summary.write_report(log_dir)?;
    info!("Run report written to {:?}", path);
    println!("  Report:            {}", path.display());
    if let Some(records) = &summary.records_log {
        println!("  Record outcomes:   {}", records.display());
    }
    println!();

    let status = CommandStatus::of(summary);
    if let Some(reason) = &summary.abort_reason {
        println!("✗ Run aborted: {reason}");
    } else if summary.interrupted {
        println!("⚠ Run interrupted; re-run to continue");
    } else if summary.failed > 0 {
        println!("⚠ {} record(s) failed; see the report", summary.failed);
    } else {
        println!("✓ Done");
    }
    Ok(status)
}

/// Returns a token cancelled on the first Ctrl-C.
///
/// The record in flight still completes; the run stops before the next one.
pub fn cancel_on_ctrl_c() -> CancelToken {
    let token = CancelToken::new();
    let handle = token.clone();
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "cannot install Ctrl-C handler");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current record");
                    handle.cancel();
                }
            });
        });
    if let Err(e) = spawned {
        warn!(error = %e, "cannot spawn Ctrl-C watcher");
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exact_yes_confirms() {
        assert!(is_yes("yes\n"));
        assert!(is_yes("  yes "));
        assert!(!is_yes("y\n"));
        assert!(!is_yes("YES"));
        assert!(!is_yes(""));
    }

    #[test]
    fn force_and_dry_run_skip_prompt() {
        assert!(confirmed(true, false, "?").unwrap());
        assert!(confirmed(false, true, "?").unwrap());
    }

    #[test]
    fn finish_maps_status_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();

        let mut ok = RunSummary::new("verify", false);
        ok.finish();
        assert_eq!(finish(&ok, dir.path()).unwrap(), CommandStatus::Success);

        let mut aborted = RunSummary::new("migrate", false);
        aborted.abort_reason = Some("store locked".into());
        assert_eq!(finish(&aborted, dir.path()).unwrap(), CommandStatus::Aborted);

        let mut failed = RunSummary::new("rotate", false);
        failed.failed = 1;
        assert_eq!(finish(&failed, dir.path()).unwrap(), CommandStatus::RecordsFailed);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
