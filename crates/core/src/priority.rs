//! Priority calculus and origin channels.
//!
//! Tokens carry two independent classifications. [`Priority`] is the clinical
//! or commercial urgency class and is a total order used by allocation and
//! displacement. [`Source`] is the origin channel (walk-in desk vs online
//! booking) and is never an ordering key; it only gates the walk-in
//! preference during imminent-slot backfill.

use serde::{Deserialize, Serialize};

/// Urgency class of a token, ordered from most to least urgent.
///
/// The derived order puts `Emergency` first, so ascending sorts place the
/// most urgent tokens at the front. [`Priority::rank`] exposes the numeric
/// form (1 = most urgent) used in audit payloads.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Emergency,
    Paid,
    #[serde(rename = "FOLLOWUP")]
    FollowUp,
    Online,
    Walkin,
}

impl Priority {
    /// Numeric rank, 1 = most urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Emergency => 1,
            Priority::Paid => 2,
            Priority::FollowUp => 3,
            Priority::Online => 4,
            Priority::Walkin => 5,
        }
    }

    /// Canonical upper-case name, as it appears in audit payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Emergency => "EMERGENCY",
            Priority::Paid => "PAID",
            Priority::FollowUp => "FOLLOWUP",
            Priority::Online => "ONLINE",
            Priority::Walkin => "WALKIN",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin channel of a token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Walkin,
    Online,
}

impl Source {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Walkin => "WALKIN",
            Source::Online => "ONLINE",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the occupant a full slot evicts to make room for an emergency.
///
/// Selection rule: the occupant with the least urgent priority; among equals,
/// the oldest `created_at` (FIFO). Emergencies are never victims, so they are
/// filtered out up front; a slot occupied entirely by emergencies yields
/// `None` and the caller moves on to the next slot.
pub fn displacement_victim<'a>(
    occupants: impl IntoIterator<Item = &'a crate::token::Token>,
) -> Option<&'a crate::token::Token> {
    occupants
        .into_iter()
        .filter(|t| t.priority != Priority::Emergency)
        .max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order_emergency_first() {
        let mut priorities = vec![
            Priority::Walkin,
            Priority::Emergency,
            Priority::Online,
            Priority::Paid,
            Priority::FollowUp,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                Priority::Emergency,
                Priority::Paid,
                Priority::FollowUp,
                Priority::Online,
                Priority::Walkin,
            ]
        );
    }

    #[test]
    fn test_rank_matches_order() {
        assert_eq!(Priority::Emergency.rank(), 1);
        assert_eq!(Priority::Walkin.rank(), 5);
        assert!(Priority::Emergency < Priority::Paid);
        assert!(Priority::Online < Priority::Walkin);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&Priority::FollowUp).unwrap(),
            "\"FOLLOWUP\""
        );
        assert_eq!(serde_json::to_string(&Source::Walkin).unwrap(), "\"WALKIN\"");
    }

    mod victim {
        use super::super::*;
        use crate::doctor::DoctorId;
        use crate::slot::SlotId;
        use crate::token::{IdempotencyKey, Token, TokenId, TokenStatus};
        use chrono::NaiveDate;
        use opd_types::NonEmptyText;

        fn occupant(priority: Priority, created_minute: u32) -> Token {
            let date = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();
            let created = date.and_hms_opt(8, created_minute, 0).unwrap();
            Token {
                id: TokenId::new(),
                display_id: format!("TKN-02082026-D01-{:03}", created_minute),
                idempotency_key: IdempotencyKey::new(format!("key-{}", created_minute))
                    .unwrap(),
                doctor_id: DoctorId::new(),
                date,
                patient_name: NonEmptyText::new("Patient").unwrap(),
                phone: None,
                age: None,
                notes: None,
                source: Source::Online,
                priority,
                status: TokenStatus::Allocated {
                    slot_id: SlotId::new(),
                    allocated_at: created,
                },
                created_at: created,
            }
        }

        #[test]
        fn test_lowest_priority_is_evicted() {
            let paid = occupant(Priority::Paid, 0);
            let walkin = occupant(Priority::Walkin, 1);
            let online = occupant(Priority::Online, 2);

            let victim = displacement_victim([&paid, &walkin, &online]).unwrap();
            assert_eq!(victim.id, walkin.id);
        }

        #[test]
        fn test_fifo_tie_break_evicts_oldest() {
            let older = occupant(Priority::Online, 5);
            let newer = occupant(Priority::Online, 30);

            let victim = displacement_victim([&newer, &older]).unwrap();
            assert_eq!(victim.id, older.id);
        }

        #[test]
        fn test_emergencies_are_never_victims() {
            let emergency = occupant(Priority::Emergency, 0);
            assert!(displacement_victim([&emergency]).is_none());

            let paid = occupant(Priority::Paid, 1);
            let victim = displacement_victim([&emergency, &paid]).unwrap();
            assert_eq!(victim.id, paid.id);
        }
    }
}
