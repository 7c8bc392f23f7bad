//! Tokens and their status state machine.
//!
//! A token is a patient's claim on a doctor for a date. Its status enum
//! carries variant payloads so that "has a slot iff allocated" holds by
//! construction: only [`TokenStatus::Allocated`] stores a slot id, and every
//! transition out of it drops the binding.
//!
//! Allowed transitions:
//!
//! | From | To |
//! |---|---|
//! | Waiting | Allocated, Cancelled, Expired |
//! | Allocated | Completed, NoShow, Cancelled, Waiting (displacement) |
//! | Completed / Cancelled / NoShow / Expired | — |
//!
//! The transition helpers on [`Token`] validate the source state and return
//! [`TokenError`] for anything else.

use crate::doctor::DoctorId;
use crate::error::{TokenError, TokenResult};
use crate::priority::{Priority, Source};
use crate::slot::SlotId;
use opd_types::{NonEmptyText, PhoneNumber};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Allocates a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Client-supplied key identifying a logical create request.
///
/// Replaying a create with the same key returns the original token; the
/// storage layer enforces uniqueness across all tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wraps a non-empty key.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidInput` for an empty or whitespace-only key.
    pub fn new(input: impl AsRef<str>) -> TokenResult<Self> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TokenError::InvalidInput(
                "idempotency key cannot be empty".into(),
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The token status state machine.
///
/// Terminal states (`Completed`, `Cancelled`, `NoShow`, `Expired`) carry the
/// instant they were entered and never a slot binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Waiting,
    Allocated {
        slot_id: SlotId,
        allocated_at: chrono::NaiveDateTime,
    },
    Completed {
        completed_at: chrono::NaiveDateTime,
    },
    Cancelled {
        cancelled_at: chrono::NaiveDateTime,
    },
    NoShow {
        marked_at: chrono::NaiveDateTime,
    },
    Expired {
        expired_at: chrono::NaiveDateTime,
    },
}

impl TokenStatus {
    /// Canonical upper-case name, as it appears in audit payloads.
    pub fn name(&self) -> &'static str {
        match self {
            TokenStatus::Waiting => "WAITING",
            TokenStatus::Allocated { .. } => "ALLOCATED",
            TokenStatus::Completed { .. } => "COMPLETED",
            TokenStatus::Cancelled { .. } => "CANCELLED",
            TokenStatus::NoShow { .. } => "NO_SHOW",
            TokenStatus::Expired { .. } => "EXPIRED",
        }
    }

    /// True for states with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            TokenStatus::Waiting | TokenStatus::Allocated { .. }
        )
    }
}

/// A patient's claim on a doctor for a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    /// Human-readable identifier issued by the naming collaborator.
    pub display_id: String,
    pub idempotency_key: IdempotencyKey,
    pub doctor_id: DoctorId,
    pub date: chrono::NaiveDate,
    pub patient_name: NonEmptyText,
    pub phone: Option<PhoneNumber>,
    pub age: Option<u8>,
    pub notes: Option<String>,
    pub source: Source,
    pub priority: Priority,
    pub status: TokenStatus,
    pub created_at: chrono::NaiveDateTime,
}

impl Token {
    /// True while the token waits for a seat.
    pub fn is_waiting(&self) -> bool {
        matches!(self.status, TokenStatus::Waiting)
    }

    /// The slot this token currently occupies, if allocated.
    pub fn allocated_slot(&self) -> Option<SlotId> {
        match self.status {
            TokenStatus::Allocated { slot_id, .. } => Some(slot_id),
            _ => None,
        }
    }

    /// Waiting -> Allocated.
    ///
    /// # Errors
    ///
    /// `InvalidStatus` unless the token is currently waiting.
    pub fn allocate_to(
        &mut self,
        slot_id: SlotId,
        now: chrono::NaiveDateTime,
    ) -> TokenResult<()> {
        match self.status {
            TokenStatus::Waiting => {
                self.status = TokenStatus::Allocated {
                    slot_id,
                    allocated_at: now,
                };
                Ok(())
            }
            _ => Err(self.bad_transition("ALLOCATED")),
        }
    }

    /// Allocated -> Waiting, used only when a higher-priority admission
    /// evicts this token. Returns the slot it occupied.
    ///
    /// # Errors
    ///
    /// `InvalidStatus` unless the token is currently allocated.
    pub fn displace(&mut self) -> TokenResult<SlotId> {
        match self.status {
            TokenStatus::Allocated { slot_id, .. } => {
                self.status = TokenStatus::Waiting;
                Ok(slot_id)
            }
            _ => Err(self.bad_transition("WAITING")),
        }
    }

    /// Waiting | Allocated -> Cancelled. Returns the slot the token occupied,
    /// if any, so the caller can backfill it.
    ///
    /// # Errors
    ///
    /// - `AlreadyCancelled` if the token is cancelled.
    /// - `CannotCancelCompleted` if the token is completed.
    /// - `InvalidStatus` for other terminal states.
    pub fn cancel(&mut self, now: chrono::NaiveDateTime) -> TokenResult<Option<SlotId>> {
        match self.status {
            TokenStatus::Waiting => {
                self.status = TokenStatus::Cancelled { cancelled_at: now };
                Ok(None)
            }
            TokenStatus::Allocated { slot_id, .. } => {
                self.status = TokenStatus::Cancelled { cancelled_at: now };
                Ok(Some(slot_id))
            }
            TokenStatus::Cancelled { .. } => Err(TokenError::AlreadyCancelled(self.id)),
            TokenStatus::Completed { .. } => Err(TokenError::CannotCancelCompleted(self.id)),
            _ => Err(self.bad_transition("CANCELLED")),
        }
    }

    /// Allocated -> NoShow. Returns the vacated slot.
    ///
    /// # Errors
    ///
    /// `InvalidStatus` unless the token is currently allocated.
    pub fn mark_no_show(&mut self, now: chrono::NaiveDateTime) -> TokenResult<SlotId> {
        match self.status {
            TokenStatus::Allocated { slot_id, .. } => {
                self.status = TokenStatus::NoShow { marked_at: now };
                Ok(slot_id)
            }
            _ => Err(self.bad_transition("NO_SHOW")),
        }
    }

    /// Allocated -> Completed. Returns the vacated slot.
    ///
    /// # Errors
    ///
    /// `InvalidStatus` unless the token is currently allocated.
    pub fn complete(&mut self, now: chrono::NaiveDateTime) -> TokenResult<SlotId> {
        match self.status {
            TokenStatus::Allocated { slot_id, .. } => {
                self.status = TokenStatus::Completed { completed_at: now };
                Ok(slot_id)
            }
            _ => Err(self.bad_transition("COMPLETED")),
        }
    }

    /// Waiting -> Expired, used by end-of-day expiry.
    ///
    /// # Errors
    ///
    /// `InvalidStatus` unless the token is currently waiting.
    pub fn expire(&mut self, now: chrono::NaiveDateTime) -> TokenResult<()> {
        match self.status {
            TokenStatus::Waiting => {
                self.status = TokenStatus::Expired { expired_at: now };
                Ok(())
            }
            _ => Err(self.bad_transition("EXPIRED")),
        }
    }

    fn bad_transition(&self, to: &'static str) -> TokenError {
        TokenError::InvalidStatus {
            from: self.status.name(),
            to,
        }
    }
}
