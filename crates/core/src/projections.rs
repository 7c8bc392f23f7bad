use crate::capacity::SlotCounts;
use crate::clock::Clock;
use crate::doctor::DoctorId;
use crate::engine::TokenEngine;
use crate::error::TokenResult;
use crate::slot::Slot;
use crate::store::{LockScope, StoreTxn, TokenStore};
use crate::token::Token;
use chrono::NaiveDate;
use serde::Serialize;

/// Availability of one slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    pub slot: Slot,
    pub allocated: u32,
    /// Free seats under total capacity.
    pub remaining: u32,
    pub paid_used: u32,
    pub follow_up_used: u32,
    pub has_ended: bool,
}

impl<S: TokenStore, C: Clock> TokenEngine<S, C> {
    /// Per-slot occupancy for a doctor-date, start-ordered. Inactive slots
    /// are excluded.
    pub fn slot_availability(
        &self,
        doctor_id: DoctorId,
        date: NaiveDate,
    ) -> TokenResult<Vec<SlotAvailability>> {
        let scope = LockScope { doctor_id, date };
        let txn = self.store().begin(&scope)?;
        let now = self.clock().now();

        let tokens = txn.tokens_for(doctor_id, date)?;
        let mut slots: Vec<Slot> = txn
            .slots_for(doctor_id, date)?
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        slots.sort_by_key(|s| s.start);

        Ok(slots
            .into_iter()
            .map(|slot| {
                let counts = SlotCounts::tally(slot.id, &tokens);
                SlotAvailability {
                    allocated: counts.allocated,
                    remaining: slot.capacity.saturating_sub(counts.allocated),
                    paid_used: counts.paid,
                    follow_up_used: counts.follow_up,
                    has_ended: slot.has_ended(now),
                    slot,
                }
            })
            .collect())
    }

    /// Waiting tokens for a doctor-date in promotion order:
    /// `(priority, created_at)` ascending.
    pub fn waiting_list(&self, doctor_id: DoctorId, date: NaiveDate) -> TokenResult<Vec<Token>> {
        let scope = LockScope { doctor_id, date };
        let txn = self.store().begin(&scope)?;

        let mut waiting: Vec<Token> = txn
            .tokens_for(doctor_id, date)?
            .into_iter()
            .filter(Token::is_waiting)
            .collect();
        waiting.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(waiting)
    }

    /// Committed audit events for a doctor-date, oldest first.
    pub fn audit_trail(
        &self,
        doctor_id: DoctorId,
        date: NaiveDate,
    ) -> TokenResult<Vec<crate::audit::AuditEvent>> {
        let scope = LockScope { doctor_id, date };
        let txn = self.store().begin(&scope)?;
        txn.audit_for(doctor_id, date)
    }
}
