//! Bulk re-encryption of stored fields.
//!
//! Two drivers share one paged runner:
//!
//! - [`MigrationDriver`] re-encrypts legacy values into the current envelope
//! - [`RotationDriver`] re-encrypts current envelopes from an old key to a new
//!   one, and checks that everything reads under a given key
//!
//! ## Guarantees
//!
//! - **Verified**: every new envelope is decrypted and compared with the
//!   plaintext before it is written
//! - **Per-record atomic**: all changed fields of a record are written in
//!   one compare-and-set update
//! - **Independent**: a failed record never stops the run or undoes others
//! - **Idempotent**: fields already in the target state are left alone, so a
//!   run can be repeated any number of times
//!
//! Key publishing and the operator cutover live in [`KeyRotation`].

mod driver;
mod report;
mod rotation;
mod runner;

pub use driver::{MigrationDriver, MigrationKeys};
pub use report::{
    fingerprint, FailureEntry, FieldOutcome, FieldStatus, RecordLog, RecordOutcome, RecordStatus,
    RunSummary,
};
pub use rotation::{CutoverReceipt, KeyRotation, RotationDriver};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked between records.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The record in progress still completes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receives progress while a run is in flight.
///
/// Called from worker threads; implementations must be `Sync`.
pub trait MigrationObserver: Sync {
    /// Called after each record, in completion order.
    fn on_record(&self, _outcome: &RecordOutcome) {}

    /// Called after each scanned page.
    fn on_page(&self, _collection: &str, _documents: usize) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
