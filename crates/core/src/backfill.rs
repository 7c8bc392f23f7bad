//! The reallocation procedure.
//!
//! When a cancellation or no-show frees a seat in a slot that has not ended,
//! waiting tokens are promoted. The freed slot decides *who* is considered
//! first: if it is imminent (starting within the configured window, or
//! already in progress), walk-in patients get preference — they are the ones
//! physically present at the desk. If no walk-in is waiting, the preference
//! falls away rather than leaving the seat empty.
//!
//! Promotion goes through the general allocation procedure, so a promoted
//! token may land in any active future slot, not necessarily the freed one;
//! the scan simply starts because a seat opened.

use crate::allocation::allocate;
use crate::error::TokenResult;
use crate::priority::Source;
use crate::slot::Slot;
use crate::store::StoreTxn;
use crate::token::Token;
use chrono::{Duration, NaiveDateTime};

/// A waiting token promoted into a slot during backfill.
#[derive(Debug, Clone)]
pub struct PromotedToken {
    pub token: Token,
    pub slot: Slot,
}

/// Promotes waiting tokens after `freed_slot` lost an occupant.
///
/// Runs inside the transaction that performed the cancellation or no-show.
/// Returns the tokens that actually received seats, in promotion order.
///
/// # Errors
///
/// Any storage error from the transaction.
pub fn backfill<T: StoreTxn>(
    txn: &mut T,
    freed_slot: &Slot,
    now: NaiveDateTime,
    imminent_window: Duration,
) -> TokenResult<Vec<PromotedToken>> {
    if freed_slot.has_ended(now) {
        return Ok(Vec::new());
    }

    let mut waiting: Vec<Token> = txn
        .tokens_for(freed_slot.doctor_id, freed_slot.date)?
        .into_iter()
        .filter(Token::is_waiting)
        .collect();
    waiting.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let candidates: Vec<Token> = if freed_slot.is_imminent(now, imminent_window) {
        let walkins: Vec<Token> = waiting
            .iter()
            .filter(|t| t.source == Source::Walkin)
            .cloned()
            .collect();
        if walkins.is_empty() {
            // Nobody is physically present; better a filled seat than an
            // honoured preference.
            waiting
        } else {
            walkins
        }
    } else {
        waiting
    };

    let mut promoted = Vec::new();
    for candidate in candidates {
        let display_id = candidate.display_id.clone();
        let outcome = allocate(txn, candidate, now)?;
        if let Some(slot) = outcome.assigned_slot {
            tracing::info!(
                token = %display_id,
                slot = %slot.display_id,
                "promoted waiting token into freed capacity"
            );
            promoted.push(PromotedToken {
                token: outcome.token,
                slot,
            });
        }
    }
    Ok(promoted)
}
