//! Engine runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the
//! engine; nothing here is read from the environment during request handling,
//! which keeps behaviour consistent across multi-threaded runtimes and test
//! harnesses.
//!
//! # Fields
//!
//! - **Retry policy**: how many times a storage-conflicted transaction is
//!   re-run, and the backoff between attempts.
//! - **Imminent window**: how close to its start a slot must be for backfill
//!   to prefer walk-in patients.
//!
//! All values are validated at construction time.

use crate::constants::{
    DEFAULT_IMMINENT_WINDOW_MINUTES, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MS,
};
use crate::error::{TokenError, TokenResult};
use chrono::Duration;

/// Engine configuration resolved at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    retry_attempts: u32,
    retry_backoff: std::time::Duration,
    imminent_window: Duration,
}

impl EngineConfig {
    /// Creates a validated engine configuration.
    ///
    /// # Arguments
    ///
    /// * `retry_attempts` - Storage-conflict retry budget; must be at least 1.
    /// * `retry_backoff_ms` - Base backoff between retries in milliseconds.
    /// * `imminent_window_minutes` - Walk-in preference window; must be
    ///   positive.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidInput` if any bound is violated.
    pub fn new(
        retry_attempts: u32,
        retry_backoff_ms: u64,
        imminent_window_minutes: i64,
    ) -> TokenResult<Self> {
        if retry_attempts == 0 {
            return Err(TokenError::InvalidInput(
                "retry_attempts must be at least 1".into(),
            ));
        }
        if imminent_window_minutes <= 0 {
            return Err(TokenError::InvalidInput(
                "imminent_window_minutes must be positive".into(),
            ));
        }
        Ok(Self {
            retry_attempts,
            retry_backoff: std::time::Duration::from_millis(retry_backoff_ms),
            imminent_window: Duration::minutes(imminent_window_minutes),
        })
    }

    /// Storage-conflict retry budget (total attempts, including the first).
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Base backoff between storage-conflict retries.
    pub fn retry_backoff(&self) -> std::time::Duration {
        self.retry_backoff
    }

    /// The walk-in preference window for imminent slots.
    pub fn imminent_window(&self) -> Duration {
        self.imminent_window
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: std::time::Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            imminent_window: Duration::minutes(DEFAULT_IMMINENT_WINDOW_MINUTES),
        }
    }
}
