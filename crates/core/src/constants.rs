//! Constants used throughout the engine crate.

/// How many times a storage-conflicted transaction is re-run before the
/// conflict is surfaced to the caller. Three attempts are sufficient for
/// realistic outpatient loads.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Base backoff between storage-conflict retries, in milliseconds. The nth
/// retry sleeps n times this long.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 25;

/// A slot is "imminent" when it starts within this many minutes (or has
/// already started but not ended). Imminent slots prefer walk-in patients
/// during backfill, since those patients are physically present.
pub const DEFAULT_IMMINENT_WINDOW_MINUTES: i64 = 60;

/// Audit detail key carrying a human-readable reason for a decision.
pub const DETAIL_REASON: &str = "reason";

/// Audit detail key carrying the display identifier of the affected token.
pub const DETAIL_DISPLAY_ID: &str = "display_id";

/// Audit detail key carrying the number of tokens affected by a bulk
/// operation.
pub const DETAIL_COUNT: &str = "count";
