//! Slots: fixed time windows with capped seats.
//!
//! A slot is a window `[start, end)` on a date for one doctor. `capacity`
//! bounds the number of concurrently allocated tokens, always. The two
//! sub-caps bound paid and follow-up admissions specifically; an emergency
//! displacement may overshoot a sub-cap but never total capacity.
//!
//! Timing predicates ([`Slot::has_ended`], [`Slot::is_imminent`]) take the
//! current time as an argument; the caller reads it from the injected
//! [`Clock`](crate::clock::Clock) so the predicates stay pure.

use crate::doctor::DoctorId;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SlotId(Uuid);

impl SlotId {
    /// Allocates a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// A per-priority seat bound.
///
/// `Unlimited` means the priority class is bounded only by total capacity.
/// A sub-cap never exceeds the slot's capacity; slot registration enforces
/// this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatCap {
    Unlimited,
    Cap(u32),
}

impl SeatCap {
    /// Whether one more admission is allowed given `current` occupants of the
    /// class.
    pub fn admits(&self, current: u32) -> bool {
        match self {
            SeatCap::Unlimited => true,
            SeatCap::Cap(limit) => current < *limit,
        }
    }

    /// The numeric bound, if any.
    pub fn limit(&self) -> Option<u32> {
        match self {
            SeatCap::Unlimited => None,
            SeatCap::Cap(limit) => Some(*limit),
        }
    }
}

impl fmt::Display for SeatCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatCap::Unlimited => f.write_str("unlimited"),
            SeatCap::Cap(limit) => write!(f, "{}", limit),
        }
    }
}

/// A fixed time window on a date for one doctor, with capped seats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub doctor_id: DoctorId,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Hard upper bound on concurrently allocated tokens. At least 1.
    pub capacity: u32,
    pub paid_cap: SeatCap,
    pub follow_up_cap: SeatCap,
    /// Inactive slots are invisible to allocation.
    pub is_active: bool,
    /// Human-readable identifier issued by the naming collaborator.
    pub display_id: String,
}

impl Slot {
    /// The instant the slot opens.
    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start)
    }

    /// The instant the slot closes.
    pub fn end_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end)
    }

    /// True once the slot's window has fully passed.
    pub fn has_ended(&self, now: NaiveDateTime) -> bool {
        now >= self.end_at()
    }

    /// True when the slot starts within `window` of `now`, including slots
    /// already in progress but not yet ended.
    pub fn is_imminent(&self, now: NaiveDateTime, window: Duration) -> bool {
        !self.has_ended(now) && self.start_at() - now <= window
    }
}
