//! Retry policy for conflicting write transactions.
//!
//! Implements exponential backoff with configurable parameters. Only
//! errors that report themselves as retryable are re-run; everything else
//! is returned to the caller on the first attempt.

use crate::catalog_store::{CatalogError, CatalogResult};
use crate::config::RankingSettings;
use crate::server::metrics;
use std::time::Duration;
use tracing::warn;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct ConflictRetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Cap for exponential growth, in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl ConflictRetryPolicy {
    pub fn new(settings: &RankingSettings) -> Self {
        Self {
            max_retries: settings.max_conflict_retries,
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }

    pub fn should_retry(&self, error: &CatalogError, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// runs out of retries, in which case `RetriesExhausted` is returned.
    pub fn execute<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let mut retry_count = 0;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, retry_count) => {
                    let backoff = self.backoff(retry_count);
                    warn!(
                        "{} hit a conflict (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        retry_count + 1,
                        self.max_retries + 1,
                        backoff,
                        err
                    );
                    metrics::record_transaction_retry(operation);
                    std::thread::sleep(backoff);
                    retry_count += 1;
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        "{} gave up after {} attempts: {}",
                        operation,
                        retry_count + 1,
                        err
                    );
                    metrics::record_retries_exhausted(operation);
                    return Err(CatalogError::RetriesExhausted {
                        operation,
                        attempts: retry_count + 1,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self::new(&RankingSettings::default())
    }
}
