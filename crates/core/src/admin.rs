//! Schedule administration: doctors and slots.
//!
//! The engine allocates against slots somebody else configured. This module
//! is that somebody: registration of doctors and slots, soft-deletion, and
//! cap retuning. The one rule the allocation invariants impose here is that
//! a retune may never push a bound below what is already allocated — the
//! engine rejects the change rather than retroactively displacing patients.

use crate::capacity::SlotCounts;
use crate::clock::Clock;
use crate::doctor::{Doctor, DoctorId};
use crate::engine::TokenEngine;
use crate::error::{TokenError, TokenResult};
use crate::priority::Priority;
use crate::slot::{SeatCap, Slot, SlotId};
use crate::store::{LockScope, StoreTxn, TokenStore};
use chrono::NaiveDate;
use opd_naming::{DisplayId, DisplayKind};
use opd_types::{ClinicDate, ClockTime, NonEmptyText};

/// Request to register a doctor.
#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub name: NonEmptyText,
    /// Short code embedded in display identifiers, e.g. `D01`.
    pub code: String,
}

/// Request to register a slot.
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub doctor_id: DoctorId,
    pub date: ClinicDate,
    pub start: ClockTime,
    pub end: ClockTime,
    pub capacity: u32,
    pub paid_cap: SeatCap,
    pub follow_up_cap: SeatCap,
}

impl<S: TokenStore, C: Clock> TokenEngine<S, C> {
    /// Registers an active doctor.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed short code.
    pub fn register_doctor(&self, input: NewDoctor) -> TokenResult<Doctor> {
        let code = input.code.trim().to_ascii_uppercase();
        let code_ok = !code.is_empty()
            && code.len() <= 8
            && code.bytes().all(|b| b.is_ascii_alphanumeric());
        if !code_ok {
            return Err(TokenError::InvalidInput(format!(
                "doctor code '{}' must be 1-8 alphanumeric characters",
                input.code
            )));
        }

        let doctor = Doctor {
            id: DoctorId::new(),
            name: input.name,
            code,
            is_active: true,
        };
        let scope = LockScope {
            doctor_id: doctor.id,
            date: self.clock().now().date(),
        };
        let mut txn = self.store().begin(&scope)?;
        txn.insert_doctor(doctor.clone())?;
        txn.commit()?;
        tracing::info!(doctor = %doctor.id, code = %doctor.code, "doctor registered");
        Ok(doctor)
    }

    /// Registers an active slot for a doctor-date.
    ///
    /// # Errors
    ///
    /// - `DoctorNotFound` for an unknown or inactive doctor.
    /// - `InvalidInput` when `end <= start`, `capacity == 0`, or a sub-cap
    ///   exceeds capacity.
    pub fn register_slot(&self, input: NewSlot) -> TokenResult<Slot> {
        if input.end <= input.start {
            return Err(TokenError::InvalidInput(format!(
                "slot must end after it starts ({} >= {})",
                input.start, input.end
            )));
        }
        if input.capacity == 0 {
            return Err(TokenError::InvalidInput(
                "slot capacity must be at least 1".into(),
            ));
        }
        for (label, cap) in [("paid_cap", input.paid_cap), ("follow_up_cap", input.follow_up_cap)] {
            if let Some(limit) = cap.limit() {
                if limit > input.capacity {
                    return Err(TokenError::InvalidInput(format!(
                        "{} {} exceeds capacity {}",
                        label, limit, input.capacity
                    )));
                }
            }
        }

        let scope = LockScope {
            doctor_id: input.doctor_id,
            date: input.date.as_naive(),
        };
        let mut txn = self.store().begin(&scope)?;
        let doctor = txn
            .doctor(input.doctor_id)?
            .filter(|d| d.is_active)
            .ok_or(TokenError::DoctorNotFound(input.doctor_id))?;

        let existing = txn.slots_for(scope.doctor_id, scope.date)?;
        let taken: std::collections::HashSet<String> =
            existing.iter().map(|s| s.display_id.clone()).collect();
        let display_id = DisplayId::generate(
            DisplayKind::Slot,
            &doctor.code,
            scope.date,
            existing.len() as u32 + 1,
            |candidate| taken.contains(candidate.as_str()),
        )?;

        let slot = Slot {
            id: SlotId::new(),
            doctor_id: doctor.id,
            date: scope.date,
            start: input.start.as_naive(),
            end: input.end.as_naive(),
            capacity: input.capacity,
            paid_cap: input.paid_cap,
            follow_up_cap: input.follow_up_cap,
            is_active: true,
            display_id: display_id.to_string(),
        };
        txn.insert_slot(slot.clone())?;
        txn.commit()?;
        tracing::info!(slot = %slot.display_id, "slot registered");
        Ok(slot)
    }

    /// Soft-deletes a slot: it becomes invisible to allocation. Tokens
    /// already allocated to it are untouched.
    ///
    /// # Errors
    ///
    /// `SlotNotFound` if the slot is not in the given scope.
    pub fn deactivate_slot(
        &self,
        doctor_id: DoctorId,
        date: NaiveDate,
        slot_id: SlotId,
    ) -> TokenResult<Slot> {
        let scope = LockScope { doctor_id, date };
        let mut txn = self.store().begin(&scope)?;
        let mut slot = txn.slot(slot_id)?.ok_or(TokenError::SlotNotFound(slot_id))?;
        slot.is_active = false;
        txn.update_slot(&slot)?;
        txn.commit()?;
        tracing::info!(slot = %slot.display_id, "slot deactivated");
        Ok(slot)
    }

    /// Retunes a slot's capacity and sub-caps.
    ///
    /// A bound may never drop below what is already allocated: the change is
    /// rejected instead of displacing patients retroactively.
    ///
    /// # Errors
    ///
    /// - `SlotNotFound` if the slot is not in the given scope.
    /// - `InvalidInput` for bounds invalid on their own terms.
    /// - `CapacityInconsistent` when a new bound is below current usage.
    pub fn retune_slot_caps(
        &self,
        doctor_id: DoctorId,
        date: NaiveDate,
        slot_id: SlotId,
        capacity: u32,
        paid_cap: SeatCap,
        follow_up_cap: SeatCap,
    ) -> TokenResult<Slot> {
        if capacity == 0 {
            return Err(TokenError::InvalidInput(
                "slot capacity must be at least 1".into(),
            ));
        }
        for (label, cap) in [("paid_cap", paid_cap), ("follow_up_cap", follow_up_cap)] {
            if let Some(limit) = cap.limit() {
                if limit > capacity {
                    return Err(TokenError::InvalidInput(format!(
                        "{} {} exceeds capacity {}",
                        label, limit, capacity
                    )));
                }
            }
        }

        let scope = LockScope { doctor_id, date };
        let mut txn = self.store().begin(&scope)?;
        let mut slot = txn.slot(slot_id)?.ok_or(TokenError::SlotNotFound(slot_id))?;

        let tokens = txn.tokens_for(doctor_id, date)?;
        let counts = SlotCounts::tally(slot.id, &tokens);
        let violations: [(&str, Option<u32>, u32); 3] = [
            ("capacity", Some(capacity), counts.allocated),
            (Priority::Paid.as_str(), paid_cap.limit(), counts.paid),
            (
                Priority::FollowUp.as_str(),
                follow_up_cap.limit(),
                counts.follow_up,
            ),
        ];
        for (label, limit, used) in violations {
            if let Some(limit) = limit {
                if limit < used {
                    return Err(TokenError::CapacityInconsistent(format!(
                        "{} bound {} is below current usage {}",
                        label, limit, used
                    )));
                }
            }
        }

        slot.capacity = capacity;
        slot.paid_cap = paid_cap;
        slot.follow_up_cap = follow_up_cap;
        txn.update_slot(&slot)?;
        txn.commit()?;
        tracing::info!(slot = %slot.display_id, capacity, "slot caps retuned");
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::EngineConfig;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDateTime;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn engine() -> TokenEngine<MemoryStore, FixedClock> {
        TokenEngine::new(
            MemoryStore::new(),
            FixedClock::new(at(8)),
            EngineConfig::default(),
        )
    }

    fn new_slot(doctor_id: DoctorId) -> NewSlot {
        NewSlot {
            doctor_id,
            date: ClinicDate::parse("02-08-2026").unwrap(),
            start: ClockTime::parse("09:00").unwrap(),
            end: ClockTime::parse("10:00").unwrap(),
            capacity: 2,
            paid_cap: SeatCap::Unlimited,
            follow_up_cap: SeatCap::Unlimited,
        }
    }

    #[test]
    fn test_register_doctor_normalises_code() {
        let engine = engine();
        let doctor = engine
            .register_doctor(NewDoctor {
                name: NonEmptyText::new("Dr. Rao").unwrap(),
                code: " d01 ".to_string(),
            })
            .unwrap();
        assert_eq!(doctor.code, "D01");
        assert!(doctor.is_active);
    }

    #[test]
    fn test_register_doctor_rejects_bad_code() {
        let engine = engine();
        let result = engine.register_doctor(NewDoctor {
            name: NonEmptyText::new("Dr. Rao").unwrap(),
            code: "dr/one".to_string(),
        });
        assert!(matches!(result, Err(TokenError::InvalidInput(_))));
    }

    #[test]
    fn test_register_slot_issues_display_ids_in_sequence() {
        let engine = engine();
        let doctor = engine
            .register_doctor(NewDoctor {
                name: NonEmptyText::new("Dr. Rao").unwrap(),
                code: "D01".to_string(),
            })
            .unwrap();

        let first = engine.register_slot(new_slot(doctor.id)).unwrap();
        let mut second_input = new_slot(doctor.id);
        second_input.start = ClockTime::parse("10:00").unwrap();
        second_input.end = ClockTime::parse("11:00").unwrap();
        let second = engine.register_slot(second_input).unwrap();

        assert_eq!(first.display_id, "SLT-02082026-D01-001");
        assert_eq!(second.display_id, "SLT-02082026-D01-002");
    }

    #[test]
    fn test_register_slot_validates_window_and_caps() {
        let engine = engine();
        let doctor = engine
            .register_doctor(NewDoctor {
                name: NonEmptyText::new("Dr. Rao").unwrap(),
                code: "D01".to_string(),
            })
            .unwrap();

        let mut inverted = new_slot(doctor.id);
        inverted.start = ClockTime::parse("11:00").unwrap();
        assert!(engine.register_slot(inverted).is_err());

        let mut zero = new_slot(doctor.id);
        zero.capacity = 0;
        assert!(engine.register_slot(zero).is_err());

        let mut oversize_cap = new_slot(doctor.id);
        oversize_cap.paid_cap = SeatCap::Cap(3);
        assert!(engine.register_slot(oversize_cap).is_err());
    }

    #[test]
    fn test_register_slot_unknown_doctor() {
        let engine = engine();
        let result = engine.register_slot(new_slot(DoctorId::new()));
        assert!(matches!(result, Err(TokenError::DoctorNotFound(_))));
    }

    #[test]
    fn test_retune_rejects_bound_below_usage() {
        use crate::engine::{CreateTokenInput, OpDeadline};
        use crate::priority::{Priority, Source};
        use crate::token::IdempotencyKey;

        let engine = engine();
        let doctor = engine
            .register_doctor(NewDoctor {
                name: NonEmptyText::new("Dr. Rao").unwrap(),
                code: "D01".to_string(),
            })
            .unwrap();
        let slot = engine.register_slot(new_slot(doctor.id)).unwrap();

        for seq in 0..2 {
            engine
                .create_token(
                    CreateTokenInput {
                        doctor_id: doctor.id,
                        date: ClinicDate::parse("02-08-2026").unwrap(),
                        idempotency_key: IdempotencyKey::new(format!("key-{}", seq)).unwrap(),
                        patient_name: NonEmptyText::new("Patient").unwrap(),
                        phone: None,
                        age: None,
                        notes: None,
                        source: Source::Online,
                        priority: Priority::Online,
                    },
                    OpDeadline::NONE,
                )
                .unwrap();
        }

        let result = engine.retune_slot_caps(
            doctor.id,
            slot.date,
            slot.id,
            1,
            SeatCap::Unlimited,
            SeatCap::Unlimited,
        );
        assert!(matches!(result, Err(TokenError::CapacityInconsistent(_))));

        // Raising the bound is fine.
        let widened = engine
            .retune_slot_caps(
                doctor.id,
                slot.date,
                slot.id,
                4,
                SeatCap::Cap(2),
                SeatCap::Unlimited,
            )
            .unwrap();
        assert_eq!(widened.capacity, 4);
    }

    #[test]
    fn test_deactivated_slot_is_invisible_to_allocation() {
        use crate::engine::{CreateTokenInput, OpDeadline};
        use crate::priority::{Priority, Source};
        use crate::token::IdempotencyKey;

        let engine = engine();
        let doctor = engine
            .register_doctor(NewDoctor {
                name: NonEmptyText::new("Dr. Rao").unwrap(),
                code: "D01".to_string(),
            })
            .unwrap();
        let slot = engine.register_slot(new_slot(doctor.id)).unwrap();
        engine.deactivate_slot(doctor.id, slot.date, slot.id).unwrap();

        let outcome = engine
            .create_token(
                CreateTokenInput {
                    doctor_id: doctor.id,
                    date: ClinicDate::parse("02-08-2026").unwrap(),
                    idempotency_key: IdempotencyKey::new("key-1").unwrap(),
                    patient_name: NonEmptyText::new("Patient").unwrap(),
                    phone: None,
                    age: None,
                    notes: None,
                    source: Source::Online,
                    priority: Priority::Online,
                },
                OpDeadline::NONE,
            )
            .unwrap();
        assert!(outcome.slot.is_none());
        assert!(outcome.token.is_waiting());
    }
}
