//! The allocation procedure.
//!
//! Given a waiting token, find it a seat. Candidate slots are the doctor's
//! active slots for the date whose window has not ended, scanned in start
//! order. Occupancy is recomputed from transaction state per slot, so the
//! procedure composes with itself (backfill promotes several tokens in one
//! transaction).
//!
//! Emergencies get special handling: a full slot does not turn them away.
//! The least urgent occupant (FIFO among equals) is demoted back to waiting,
//! the emergency takes the seat, and the victim is then re-placed with the
//! same scan. A demoted token is never an emergency itself, so displacement
//! never cascades past one level; the re-placement scan admits the victim
//! only where a seat is genuinely free.

use crate::audit::{AuditEvent, AuditOperation};
use crate::capacity::{admissible, SlotCounts};
use crate::constants::DETAIL_DISPLAY_ID;
use crate::error::{TokenError, TokenResult};
use crate::priority::{displacement_victim, Priority};
use crate::slot::Slot;
use crate::store::StoreTxn;
use crate::token::Token;
use chrono::NaiveDateTime;

/// A token displaced by an emergency admission, and where it ended up.
#[derive(Debug, Clone)]
pub struct DisplacedToken {
    pub token: Token,
    /// The slot the victim was re-placed into, or `None` if it is waiting
    /// again.
    pub reassigned_slot: Option<Slot>,
}

/// Result of one allocation attempt.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    /// The token in its post-allocation state.
    pub token: Token,
    /// The slot the token was assigned, or `None` if it stays waiting.
    pub assigned_slot: Option<Slot>,
    /// Tokens evicted to make room, at most one.
    pub displaced: Vec<DisplacedToken>,
}

/// Candidate slots for a token: active, not ended, start-ordered.
fn candidate_slots<T: StoreTxn>(
    txn: &T,
    token: &Token,
    now: NaiveDateTime,
) -> TokenResult<Vec<Slot>> {
    let mut slots: Vec<Slot> = txn
        .slots_for(token.doctor_id, token.date)?
        .into_iter()
        .filter(|s| s.is_active && !s.has_ended(now))
        .collect();
    slots.sort_by_key(|s| s.start);
    Ok(slots)
}

/// Places a token into the first candidate slot with a genuinely free,
/// admissible seat. No displacement. Used for non-emergency tokens and for
/// re-placing displacement victims.
fn place_simple<T: StoreTxn>(
    txn: &mut T,
    token: &mut Token,
    now: NaiveDateTime,
) -> TokenResult<Option<Slot>> {
    for slot in candidate_slots(txn, token, now)? {
        let tokens = txn.tokens_for(token.doctor_id, token.date)?;
        let counts = SlotCounts::tally(slot.id, &tokens);
        if !admissible(token.priority, &slot, &counts) {
            continue;
        }
        if counts.allocated < slot.capacity {
            token.allocate_to(slot.id, now)?;
            txn.update_token(token)?;
            return Ok(Some(slot));
        }
    }
    Ok(None)
}

/// Finds a seat for a waiting token, displacing a lower-priority occupant if
/// the token is an emergency and every candidate slot is full.
///
/// Runs inside an open transaction that holds the token's doctor-date scope.
/// The token is taken by value and returned, post-transition, in the outcome.
///
/// # Errors
///
/// Returns `InvalidStatus` if the token is not waiting, or any storage error
/// from the transaction.
pub fn allocate<T: StoreTxn>(
    txn: &mut T,
    mut token: Token,
    now: NaiveDateTime,
) -> TokenResult<AllocationOutcome> {
    if !token.is_waiting() {
        return Err(TokenError::InvalidStatus {
            from: token.status.name(),
            to: "ALLOCATED",
        });
    }

    if token.priority != Priority::Emergency {
        let assigned_slot = place_simple(txn, &mut token, now)?;
        return Ok(AllocationOutcome {
            token,
            assigned_slot,
            displaced: Vec::new(),
        });
    }

    for slot in candidate_slots(txn, &token, now)? {
        let tokens = txn.tokens_for(token.doctor_id, token.date)?;
        let counts = SlotCounts::tally(slot.id, &tokens);

        if counts.allocated < slot.capacity {
            token.allocate_to(slot.id, now)?;
            txn.update_token(&token)?;
            return Ok(AllocationOutcome {
                token,
                assigned_slot: Some(slot),
                displaced: Vec::new(),
            });
        }

        // Full slot. Emergencies are admissible regardless, so evict the
        // least urgent occupant; a slot holding only emergencies offers no
        // victim and is skipped.
        let occupants: Vec<&Token> = tokens
            .iter()
            .filter(|t| t.allocated_slot() == Some(slot.id))
            .collect();
        let Some(victim) = displacement_victim(occupants.into_iter()) else {
            continue;
        };
        let mut victim = victim.clone();

        victim.displace()?;
        txn.update_token(&victim)?;
        token.allocate_to(slot.id, now)?;
        txn.update_token(&token)?;

        tracing::warn!(
            victim = %victim.display_id,
            emergency = %token.display_id,
            slot = %slot.display_id,
            "emergency admission displaced an allocated token"
        );
        txn.append_audit(
            AuditEvent::new(AuditOperation::EmergencyDisplacement, token.doctor_id, now)
                .token(victim.id)
                .slot(slot.id)
                .detail(DETAIL_DISPLAY_ID, &victim.display_id)
                .detail("displaced_by", &token.display_id),
        )?;

        let reassigned_slot = place_simple(txn, &mut victim, now)?;
        return Ok(AllocationOutcome {
            token,
            assigned_slot: Some(slot),
            displaced: vec![DisplacedToken {
                token: victim,
                reassigned_slot,
            }],
        });
    }

    Ok(AllocationOutcome {
        token,
        assigned_slot: None,
        displaced: Vec::new(),
    })
}
