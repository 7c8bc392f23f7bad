//! Human-readable display identifiers.
//!
//! The allocation engine identifies tokens and slots by opaque UUIDs, but
//! front-desk staff and patients need something they can read out loud. This
//! crate issues *display identifiers* in a canonical textual form that is
//! unique within `(kind, doctor, date)`:
//!
//! `{PREFIX}-{DDMMYYYY}-{DOCTOR}-{SEQ}`
//!
//! - `PREFIX`: `TKN` for tokens, `SLT` for slots
//! - `DDMMYYYY`: the clinic date, digits only
//! - `DOCTOR`: short doctor code, 1-8 uppercase alphanumerics
//! - `SEQ`: zero-padded sequence number, at least three digits
//!
//! Example: `TKN-02082026-D01-014`
//!
//! The engine treats these strings as opaque; only this crate parses them.
//! Canonical form is required for externally supplied identifiers — use
//! [`DisplayId::parse`] to validate an input string.

mod service;

pub use service::{DisplayId, DisplayKind};

/// Error type for display-identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum DisplayIdError {
    /// Invalid input provided
    #[error("invalid display identifier: {0}")]
    InvalidInput(String),
    /// No free sequence number was found within the probe bound
    #[error("exhausted sequence numbers for {0}")]
    SequenceExhausted(String),
}

/// Result type for display-identifier operations.
pub type DisplayIdResult<T> = Result<T, DisplayIdError>;
