//! Per-record outcomes and run summaries.
//!
//! Outcomes identify values only by a short SHA-256 fingerprint of the
//! stored envelope. Plaintext never reaches a report.
//!
//! A [`RunSummary`] holds counts and the failure list only. Per-record
//! outcomes go to a [`RecordLog`] page by page and are then dropped.

use crate::crypto::Format;
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Returns a short, non-reversible identifier of a stored value.
#[must_use]
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..6])
}

/// Outcome of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// Field already in the target state; nothing to write.
    AlreadyCurrent,
    /// Field re-encrypted and verified (written unless dry run).
    Migrated,
    /// Field could not be processed.
    Failed,
}

/// Per-field detail of a record outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOutcome {
    /// Field name.
    pub field: String,
    /// Format the stored value was in.
    pub source: Format,
    /// What happened to the field.
    pub status: FieldStatus,
    /// Fingerprint of the value read.
    pub old_fingerprint: String,
    /// Fingerprint of the replacement, if one was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_fingerprint: Option<String>,
    /// Error text for failed fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Overall outcome of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// No field needed a change.
    AlreadyCurrent,
    /// At least one field was replaced and verified.
    Migrated,
    /// The record was left untouched because of an error.
    Failed,
}

/// Result of processing one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    /// Collection of the record.
    pub collection: String,
    /// Record identifier.
    pub record_id: String,
    /// Overall status.
    pub status: RecordStatus,
    /// Whether the write was skipped because of dry-run mode.
    pub dry_run: bool,
    /// Per-field detail for every declared field that held a string.
    pub fields: Vec<FieldOutcome>,
    /// Error text for failed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordOutcome {
    /// Returns true if the record failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == RecordStatus::Failed
    }
}

/// A failed record in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    /// Collection of the record.
    pub collection: String,
    /// Record identifier.
    pub record_id: String,
    /// Error text.
    pub error: String,
}

/// Summary of a bulk run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Operation name (`migrate`, `rotate`, `verify`).
    pub command: String,
    /// Whether writes were suppressed.
    pub dry_run: bool,
    /// Fingerprint of the key the run checked against, for verification runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_fingerprint: Option<String>,
    /// Collections processed, in order.
    pub collections: Vec<String>,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end, set by [`RunSummary::finish`].
    pub finished_at: Option<DateTime<Utc>>,
    /// Records read.
    pub records_scanned: usize,
    /// Declared fields that held a string value.
    pub fields_scanned: usize,
    /// Fields found in the legacy format.
    pub legacy_fields: usize,
    /// Fields found in the current format.
    pub current_fields: usize,
    /// Fields in neither format.
    pub unrecognized_fields: usize,
    /// Records with nothing to do.
    pub already_current: usize,
    /// Records replaced (or that would be, in a dry run).
    pub migrated: usize,
    /// Records that failed.
    pub failed: usize,
    /// Failed records with their errors.
    pub failures: Vec<FailureEntry>,
    /// JSON-lines file holding the outcome of every migrated or failed
    /// record, when the run had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_log: Option<PathBuf>,
    /// Whether the run stopped early on cancellation.
    pub interrupted: bool,
    /// Set when a fatal error stopped the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl RunSummary {
    /// Starts a summary for `command`.
    pub fn new(command: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            command: command.into(),
            dry_run,
            key_fingerprint: None,
            collections: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            records_scanned: 0,
            fields_scanned: 0,
            legacy_fields: 0,
            current_fields: 0,
            unrecognized_fields: 0,
            already_current: 0,
            migrated: 0,
            failed: 0,
            failures: Vec::new(),
            records_log: None,
            interrupted: false,
            abort_reason: None,
        }
    }

    /// Starts an unnamed summary that a worker fills and the runner merges.
    pub(crate) fn partial() -> Self {
        Self::new(String::new(), false)
    }

    /// Folds one record outcome into the counts.
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.records_scanned += 1;
        for field in &outcome.fields {
            self.fields_scanned += 1;
            match field.source {
                Format::Legacy => self.legacy_fields += 1,
                Format::Current => self.current_fields += 1,
                Format::Unrecognized => self.unrecognized_fields += 1,
            }
        }

        match outcome.status {
            RecordStatus::AlreadyCurrent => self.already_current += 1,
            RecordStatus::Migrated => self.migrated += 1,
            RecordStatus::Failed => {
                self.failed += 1;
                self.failures.push(FailureEntry {
                    collection: outcome.collection.clone(),
                    record_id: outcome.record_id.clone(),
                    error: outcome.error.clone().unwrap_or_default(),
                });
            }
        }
    }

    /// Adds the counts of a partial summary produced by a worker.
    pub fn merge(&mut self, other: Self) {
        self.records_scanned += other.records_scanned;
        self.fields_scanned += other.fields_scanned;
        self.legacy_fields += other.legacy_fields;
        self.current_fields += other.current_fields;
        self.unrecognized_fields += other.unrecognized_fields;
        self.already_current += other.already_current;
        self.migrated += other.migrated;
        self.failed += other.failed;
        self.failures.extend(other.failures);
        self.interrupted |= other.interrupted;
        if self.abort_reason.is_none() {
            self.abort_reason = other.abort_reason;
        }
    }

    /// Stamps the end time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Returns true if every scanned record ended well and the run completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.interrupted && self.abort_reason.is_none()
    }

    /// Returns true if the run found nothing to change.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.migrated == 0 && self.failed == 0
    }

    /// Writes the summary as pretty JSON into `dir` and returns the path.
    ///
    /// The file is named `fieldseal-<command>-<YYYYmmddTHHMMSSZ>-<run id>.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_report(&self, dir: &Path) -> CoreResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stamp = self.started_at.format("%Y%m%dT%H%M%SZ");
        let path = dir.join(format!(
            "fieldseal-{}-{stamp}-{}.json",
            self.command, self.run_id
        ));
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// Append-only JSON-lines log of migrated and failed record outcomes.
///
/// Runners append each page once it is done, so a run holds at most one
/// page of outcomes in memory.
#[derive(Debug)]
pub struct RecordLog {
    path: PathBuf,
    state: Mutex<LogState>,
}

#[derive(Debug)]
struct LogState {
    writer: BufWriter<File>,
    lines: usize,
}

impl RecordLog {
    /// Creates `fieldseal-<command>-<YYYYmmddTHHMMSSZ>-<uuid>.records.jsonl`
    /// in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn create(dir: &Path, command: &str) -> CoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let path = dir.join(format!(
            "fieldseal-{command}-{stamp}-{}.records.jsonl",
            Uuid::new_v4()
        ));
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(LogState {
                writer: BufWriter::new(file),
                lines: 0,
            }),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of outcomes written so far.
    #[must_use]
    pub fn lines(&self) -> usize {
        self.state.lock().lines
    }

    /// Appends `outcomes`, one JSON object per line, and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn append(&self, outcomes: &[RecordOutcome]) -> CoreResult<()> {
        let mut state = self.state.lock();
        for outcome in outcomes {
            serde_json::to_writer(&mut state.writer, outcome)?;
            state.writer.write_all(b"\n")?;
        }
        state.writer.flush()?;
        state.lines += outcomes.len();
        Ok(())
    }
}
