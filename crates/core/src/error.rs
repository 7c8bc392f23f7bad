//! Error types for the token allocation engine.
//!
//! The [`TokenError`] enum covers every failure mode the engine can surface,
//! from business-rule rejections (invalid status transitions, unknown
//! doctors) to storage-layer faults. The split matters operationally:
//!
//! - **Business-rule failures** are reported to the caller and never retried.
//! - **[`TokenError::StorageConflict`]** is the one retryable kind: the
//!   transaction orchestrator re-runs the operation a bounded number of times
//!   before surfacing it.
//! - **[`TokenError::StorageUnavailable`]** is surfaced immediately; a broken
//!   connection does not heal inside a retry loop.
//!
//! Engine operations return [`TokenResult<T>`].

use crate::doctor::DoctorId;
use crate::slot::SlotId;
use crate::token::TokenId;

/// Comprehensive error type for all engine operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("doctor {0} not found or inactive")]
    DoctorNotFound(DoctorId),
    #[error("token {0} not found")]
    TokenNotFound(TokenId),
    #[error("slot {0} not found")]
    SlotNotFound(SlotId),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidStatus {
        from: &'static str,
        to: &'static str,
    },
    #[error("token {0} is already cancelled")]
    AlreadyCancelled(TokenId),
    #[error("token {0} is completed and cannot be cancelled")]
    CannotCancelCompleted(TokenId),
    #[error("capacity change is inconsistent with current allocations: {0}")]
    CapacityInconsistent(String),
    #[error("storage conflict, transaction must be retried")]
    StorageConflict,
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("operation deadline exceeded, transaction rolled back")]
    DeadlineExceeded,

    #[error("naming error: {0}")]
    Naming(#[from] opd_naming::DisplayIdError),
    #[error("date/time error: {0}")]
    ClinicTime(#[from] opd_types::ClinicTimeError),
}

/// Type alias for Results that can fail with [`TokenError`].
///
/// This is the standard return type for all engine operations that may fail.
pub type TokenResult<T> = std::result::Result<T, TokenError>;
