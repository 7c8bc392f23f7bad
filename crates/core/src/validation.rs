//! Cross-field validation of engine inputs.
//!
//! The boundary types in `opd-types` already guarantee formats; this module
//! adds the checks that need context the types alone cannot see, such as
//! "not in the past" against the clinic's current day.

use crate::engine::CreateTokenInput;
use crate::error::{TokenError, TokenResult};
use chrono::NaiveDate;

/// Oldest plausible patient age accepted at the boundary.
const MAX_AGE: u8 = 130;

/// Upper bound on free-text notes.
const MAX_NOTES_LEN: usize = 2000;

/// Validates a create request against the clinic's current day.
///
/// # Errors
///
/// Returns `TokenError::ClinicTime` for a past date and
/// `TokenError::InvalidInput` for implausible ages or oversized notes.
pub fn validate_create(input: &CreateTokenInput, today: NaiveDate) -> TokenResult<()> {
    input.date.not_in_past(today)?;

    if let Some(age) = input.age {
        if age > MAX_AGE {
            return Err(TokenError::InvalidInput(format!(
                "age {} is not plausible",
                age
            )));
        }
    }

    if let Some(notes) = &input.notes {
        if notes.len() > MAX_NOTES_LEN {
            return Err(TokenError::InvalidInput(format!(
                "notes exceed maximum length of {} characters",
                MAX_NOTES_LEN
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctor::DoctorId;
    use crate::priority::{Priority, Source};
    use crate::token::IdempotencyKey;
    use opd_types::{ClinicDate, NonEmptyText};

    fn input(date: &str) -> CreateTokenInput {
        CreateTokenInput {
            doctor_id: DoctorId::new(),
            date: ClinicDate::parse(date).unwrap(),
            idempotency_key: IdempotencyKey::new("key-1").unwrap(),
            patient_name: NonEmptyText::new("Asha Verma").unwrap(),
            phone: None,
            age: None,
            notes: None,
            source: Source::Online,
            priority: Priority::Online,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 2).unwrap()
    }

    #[test]
    fn test_accepts_today_and_future() {
        assert!(validate_create(&input("02-08-2026"), today()).is_ok());
        assert!(validate_create(&input("03-08-2026"), today()).is_ok());
    }

    #[test]
    fn test_rejects_past_date() {
        let result = validate_create(&input("01-08-2026"), today());
        assert!(matches!(result, Err(TokenError::ClinicTime(_))));
    }

    #[test]
    fn test_rejects_implausible_age() {
        let mut request = input("02-08-2026");
        request.age = Some(131);
        assert!(matches!(
            validate_create(&request, today()),
            Err(TokenError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_notes() {
        let mut request = input("02-08-2026");
        request.notes = Some("x".repeat(2001));
        assert!(validate_create(&request, today()).is_err());
    }
}
