//! Paged, optionally parallel pass over every declared field.

use super::report::{
    fingerprint, FieldOutcome, FieldStatus, RecordLog, RecordOutcome, RecordStatus, RunSummary,
};
use super::{CancelToken, MigrationObserver};
use crate::config::Config;
use crate::crypto::{classify, AuthenticatedCipher, Format};
use crate::error::{CoreError, CoreResult};
use crate::keys::Secret;
use crate::schema::{CollectionSchema, Schema};
use fieldseal_storage::{Document, DocumentStore, FieldChange};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What to do with one field.
pub(crate) enum FieldAction {
    /// Already in the target state.
    Keep,
    /// Replace with this verified envelope.
    Replace(String),
}

/// Location and format of the field being processed.
pub(crate) struct FieldRef<'a> {
    pub collection: &'a str,
    pub record_id: &'a str,
    pub field: &'a str,
    pub format: Format,
}

/// Per-field step of a run.
pub(crate) trait FieldTransform: Sync {
    fn apply(&self, field: &FieldRef<'_>, value: &str) -> CoreResult<FieldAction>;
}

/// Encrypts `plaintext` under `key` and checks the result decrypts back to
/// the same bytes before handing it out.
pub(crate) fn seal_verified(
    cipher: &AuthenticatedCipher,
    plaintext: &str,
    key: &Secret,
    field: &FieldRef<'_>,
) -> CoreResult<String> {
    let sealed = cipher.encrypt(plaintext, key)?;
    let mismatch = || CoreError::verification_mismatch(field.collection, field.record_id, field.field);
    let roundtrip = cipher.decrypt(&sealed, key).map_err(|_| mismatch())?;
    if roundtrip.as_bytes() != plaintext.as_bytes() {
        return Err(mismatch());
    }
    Ok(sealed)
}

/// First fatal error seen by any worker.
#[derive(Default)]
struct Abort {
    raised: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl Abort {
    fn raise(&self, reason: String) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.raised.store(true, Ordering::SeqCst);
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    fn take(&self) -> Option<String> {
        self.reason.lock().take()
    }
}

/// Shared pass used by every driver.
pub(crate) struct Runner<'a> {
    pub store: &'a dyn DocumentStore,
    pub schema: &'a Schema,
    pub config: &'a Config,
    pub cancel: &'a CancelToken,
    pub observer: &'a dyn MigrationObserver,
    pub log: Option<&'a RecordLog>,
}

/// Counts for a page plus the outcomes worth logging.
type PageResult = (RunSummary, Vec<RecordOutcome>);

impl Runner<'_> {
    /// Runs `transform` over every declared field. Writes only when `write`.
    pub fn run(
        &self,
        mut summary: RunSummary,
        transform: &dyn FieldTransform,
        write: bool,
    ) -> CoreResult<RunSummary> {
        if self.config.batch_size == 0 {
            return Err(CoreError::configuration("batch size must be at least 1"));
        }
        if self.config.workers == 0 {
            return Err(CoreError::configuration("workers must be at least 1"));
        }

        info!(
            command = %summary.command,
            run_id = %summary.run_id,
            dry_run = summary.dry_run,
            "starting run"
        );

        if let Some(log) = self.log {
            summary.records_log = Some(log.path().to_path_buf());
        }

        let abort = Abort::default();
        'collections: for collection in self.schema.collections() {
            summary.collections.push(collection.name.clone());
            debug!(collection = %collection.name, "scanning collection");

            let mut after: Option<String> = None;
            loop {
                if self.cancel.is_cancelled() {
                    summary.interrupted = true;
                    break 'collections;
                }

                let page = match self.store.scan(
                    &collection.name,
                    after.as_deref(),
                    self.config.batch_size,
                ) {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(collection = %collection.name, error = %e, "scan failed, aborting run");
                        summary.abort_reason =
                            Some(format!("scan of {} failed: {e}", collection.name));
                        break 'collections;
                    }
                };

                let count = page.documents.len();
                let (counts, outcomes) =
                    self.process_page(collection, &page.documents, transform, write, &abort);
                summary.merge(counts);
                if let Some(log) = self.log {
                    if let Err(e) = log.append(&outcomes) {
                        abort.raise(format!("writing {} failed: {e}", log.path().display()));
                    }
                }
                self.observer.on_page(&collection.name, count);

                if let Some(reason) = abort.take() {
                    warn!(reason = %reason, "fatal error, aborting run");
                    summary.abort_reason = Some(reason);
                    break 'collections;
                }
                if summary.interrupted {
                    break 'collections;
                }

                match page.next {
                    Some(next) if after.as_deref() != Some(next.as_str()) => after = Some(next),
                    _ => break,
                }
            }
        }

        if summary.interrupted {
            warn!("run interrupted");
        }
        summary.finish();
        info!(
            command = %summary.command,
            scanned = summary.records_scanned,
            legacy = summary.legacy_fields,
            already_current = summary.already_current,
            migrated = summary.migrated,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }

    fn process_page(
        &self,
        collection: &CollectionSchema,
        documents: &[Document],
        transform: &dyn FieldTransform,
        write: bool,
        abort: &Abort,
    ) -> PageResult {
        let workers = self.config.workers.min(documents.len()).max(1);
        if workers == 1 {
            return self.process_chunk(collection, documents, transform, write, abort);
        }

        let chunk_size = documents.len().div_ceil(workers);
        std::thread::scope(|scope| {
            let handles: Vec<_> = documents
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || self.process_chunk(collection, chunk, transform, write, abort))
                })
                .collect();

            let mut page = RunSummary::partial();
            let mut outcomes = Vec::new();
            for handle in handles {
                match handle.join() {
                    Ok((partial, chunk)) => {
                        page.merge(partial);
                        outcomes.extend(chunk);
                    }
                    Err(_) => abort.raise("worker thread panicked".to_string()),
                }
            }
            (page, outcomes)
        })
    }

    fn process_chunk(
        &self,
        collection: &CollectionSchema,
        documents: &[Document],
        transform: &dyn FieldTransform,
        write: bool,
        abort: &Abort,
    ) -> PageResult {
        let mut partial = RunSummary::partial();
        let mut outcomes = Vec::new();
        for document in documents {
            if self.cancel.is_cancelled() {
                partial.interrupted = true;
                break;
            }
            if abort.is_raised() {
                break;
            }

            let outcome = self.process_record(collection, document, transform, write, abort);
            match &outcome.error {
                Some(error) => warn!(
                    collection = %collection.name,
                    id = %document.id,
                    error = %error,
                    "record failed"
                ),
                None => debug!(
                    collection = %collection.name,
                    id = %document.id,
                    status = ?outcome.status,
                    "record processed"
                ),
            }
            self.observer.on_record(&outcome);
            partial.record(&outcome);
            if self.log.is_some() && outcome.status != RecordStatus::AlreadyCurrent {
                outcomes.push(outcome);
            }
        }
        (partial, outcomes)
    }

    fn process_record(
        &self,
        collection: &CollectionSchema,
        document: &Document,
        transform: &dyn FieldTransform,
        write: bool,
        abort: &Abort,
    ) -> RecordOutcome {
        let mut fields = Vec::new();
        let mut changes = Vec::new();
        let mut failure: Option<CoreError> = None;

        for spec in &collection.fields {
            // Missing, null and non-string values are not encrypted fields.
            let Some(value) = document.fields.get(&spec.name).and_then(Value::as_str) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }

            let field = FieldRef {
                collection: &collection.name,
                record_id: &document.id,
                field: &spec.name,
                format: classify(value),
            };
            let mut outcome = FieldOutcome {
                field: spec.name.clone(),
                source: field.format,
                status: FieldStatus::AlreadyCurrent,
                old_fingerprint: fingerprint(value),
                new_fingerprint: None,
                error: None,
            };

            match transform.apply(&field, value) {
                Ok(FieldAction::Keep) => {}
                Ok(FieldAction::Replace(sealed)) => {
                    outcome.status = FieldStatus::Migrated;
                    outcome.new_fingerprint = Some(fingerprint(&sealed));
                    changes.push(FieldChange::replace(spec.name.as_str(), value, sealed));
                }
                Err(e) => {
                    outcome.status = FieldStatus::Failed;
                    outcome.error = Some(e.to_string());
                    failure.get_or_insert(e);
                }
            }
            fields.push(outcome);
        }

        let mut record = RecordOutcome {
            collection: collection.name.clone(),
            record_id: document.id.clone(),
            status: RecordStatus::AlreadyCurrent,
            dry_run: false,
            fields,
            error: None,
        };

        if let Some(error) = failure {
            if error.is_fatal() {
                abort.raise(error.to_string());
            }
            record.status = RecordStatus::Failed;
            record.error = Some(error.to_string());
            return record;
        }
        if changes.is_empty() {
            return record;
        }
        if !write {
            record.status = RecordStatus::Migrated;
            record.dry_run = true;
            return record;
        }

        match self.store.update(&collection.name, &document.id, &changes) {
            Ok(()) => record.status = RecordStatus::Migrated,
            Err(e) => {
                let error = CoreError::from(e);
                if error.is_fatal() {
                    abort.raise(error.to_string());
                }
                for field in &mut record.fields {
                    if field.status == FieldStatus::Migrated {
                        field.status = FieldStatus::Failed;
                    }
                }
                record.status = RecordStatus::Failed;
                record.error = Some(error.to_string());
            }
        }
        record
    }
}
