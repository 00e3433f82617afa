//! Run configuration.

use crate::crypto::{KdfParams, RECOMMENDED_MIN_ITERATIONS};
use crate::error::{CoreError, CoreResult};

/// Upper bound on worker threads per run.
pub const MAX_WORKERS: usize = 64;

/// Configuration for a migration, rotation or verification run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Work factor for newly written envelopes.
    pub kdf: KdfParams,

    /// Number of documents fetched per scan page.
    pub batch_size: usize,

    /// Number of worker threads per page (1 = sequential).
    pub workers: usize,

    /// Perform every step except the write.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            batch_size: 100,
            workers: 1,
            dry_run: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the work factor for new envelopes.
    #[must_use]
    pub const fn kdf(mut self, params: KdfParams) -> Self {
        self.kdf = params;
        self
    }

    /// Sets the scan page size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the number of workers.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets dry-run mode.
    #[must_use]
    pub const fn dry_run(mut self, value: bool) -> Self {
        self.dry_run = value;
        self
    }

    /// Checks the configuration for operator use.
    ///
    /// Drivers accept any in-bounds configuration so tests can run with a
    /// cheap work factor. Production entry points call this first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if the batch size is zero, the
    /// worker count is outside `1..=MAX_WORKERS`, or the work factor is
    /// below [`RECOMMENDED_MIN_ITERATIONS`].
    pub fn validate(&self) -> CoreResult<()> {
        if self.batch_size == 0 {
            return Err(CoreError::configuration("batch size must be at least 1"));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(CoreError::configuration(format!(
                "workers must be between 1 and {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if !self.kdf.is_recommended() {
            return Err(CoreError::configuration(format!(
                "KDF iterations must be at least {RECOMMENDED_MIN_ITERATIONS}, got {}",
                self.kdf.iterations()
            )));
        }
        Ok(())
    }
}
