//! The capacity predicate.
//!
//! [`admissible`] is the single decision point for whether a slot can take
//! one more token of a given priority. It is a pure function over the slot's
//! configured bounds and the current occupancy counts; allocation computes
//! the counts from committed state inside its transaction and asks here.
//!
//! Emergencies are always admissible: if the slot is full, the allocation
//! procedure displaces a lower-priority occupant rather than turning the
//! emergency away. That displacement may push a paid or follow-up sub-cap
//! over its bound; total capacity is never exceeded.

use crate::priority::Priority;
use crate::slot::{Slot, SlotId};
use crate::token::Token;

/// Occupancy of a slot, computed from its currently allocated tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
    /// All allocated tokens in the slot.
    pub allocated: u32,
    /// Allocated tokens with `Priority::Paid`.
    pub paid: u32,
    /// Allocated tokens with `Priority::FollowUp`.
    pub follow_up: u32,
}

impl SlotCounts {
    /// Tallies the occupancy of `slot_id` over a set of tokens.
    ///
    /// Only tokens currently allocated to the slot are counted; waiting and
    /// terminal tokens are ignored.
    pub fn tally<'a>(slot_id: SlotId, tokens: impl IntoIterator<Item = &'a Token>) -> Self {
        let mut counts = SlotCounts::default();
        for token in tokens {
            if token.allocated_slot() != Some(slot_id) {
                continue;
            }
            counts.allocated += 1;
            match token.priority {
                Priority::Paid => counts.paid += 1,
                Priority::FollowUp => counts.follow_up += 1,
                _ => {}
            }
        }
        counts
    }
}

/// Whether `slot` can admit one more token of `priority` given `counts`.
pub fn admissible(priority: Priority, slot: &Slot, counts: &SlotCounts) -> bool {
    if priority == Priority::Emergency {
        return true;
    }
    if counts.allocated >= slot.capacity {
        return false;
    }
    match priority {
        Priority::Paid => slot.paid_cap.admits(counts.paid),
        Priority::FollowUp => slot.follow_up_cap.admits(counts.follow_up),
        _ => true,
    }
}
