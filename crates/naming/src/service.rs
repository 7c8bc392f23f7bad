//! Internal implementation of display-identifier generation and parsing.

use crate::{DisplayIdError, DisplayIdResult};
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// The kind of entity a display identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayKind {
    Token,
    Slot,
}

impl DisplayKind {
    /// The canonical prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DisplayKind::Token => "TKN",
            DisplayKind::Slot => "SLT",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "TKN" => Some(DisplayKind::Token),
            "SLT" => Some(DisplayKind::Slot),
            _ => None,
        }
    }
}

/// A validated display identifier.
///
/// Once constructed, the contained string is guaranteed to be in canonical
/// form (see the crate docs for the grammar). Construction paths:
///
/// - [`DisplayId::generate`] issues the next free identifier for a
///   `(kind, doctor, date)` scope, probing an existence predicate supplied by
///   the caller.
/// - [`DisplayId::parse`] validates an externally supplied string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayId {
    value: String,
    kind: DisplayKind,
    sequence: u32,
}

impl DisplayId {
    /// Doctor codes are short upper-case alphanumerics.
    const MAX_DOCTOR_CODE_LEN: usize = 8;

    /// Generation probes at most this many candidate sequence numbers.
    const MAX_PROBES: u32 = 10_000;

    /// Issues the next free display identifier within `(kind, doctor, date)`.
    ///
    /// Starting from `next_sequence`, candidate identifiers are offered to
    /// `is_taken` until it reports a free one. The caller supplies `is_taken`
    /// backed by whatever uniqueness source it has (typically the set of
    /// identifiers already committed for the scope); generation itself holds
    /// no state.
    ///
    /// # Arguments
    ///
    /// * `kind` - What the identifier names.
    /// * `doctor_code` - Short doctor code; normalised to upper case.
    /// * `date` - The clinic date the scope belongs to.
    /// * `next_sequence` - First sequence number to try (1-based).
    /// * `is_taken` - Existence probe for candidate identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayIdError::InvalidInput`] for a malformed doctor code
    /// and [`DisplayIdError::SequenceExhausted`] if no free sequence number is
    /// found within the probe bound.
    pub fn generate(
        kind: DisplayKind,
        doctor_code: &str,
        date: NaiveDate,
        next_sequence: u32,
        mut is_taken: impl FnMut(&DisplayId) -> bool,
    ) -> DisplayIdResult<Self> {
        let code = normalise_doctor_code(doctor_code)?;
        let start = next_sequence.max(1);

        for sequence in start..start.saturating_add(Self::MAX_PROBES) {
            let candidate = Self::compose(kind, &code, date, sequence);
            if !is_taken(&candidate) {
                return Ok(candidate);
            }
        }

        Err(DisplayIdError::SequenceExhausted(format!(
            "{}-{}-{}",
            kind.prefix(),
            date.format("%d%m%Y"),
            code
        )))
    }

    /// Builds the identifier for a known-free sequence number.
    fn compose(kind: DisplayKind, doctor_code: &str, date: NaiveDate, sequence: u32) -> Self {
        let value = format!(
            "{}-{}-{}-{:03}",
            kind.prefix(),
            date.format("%d%m%Y"),
            doctor_code,
            sequence
        );
        Self {
            value,
            kind,
            sequence,
        }
    }

    /// Validates and parses a display identifier in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayIdError::InvalidInput`] if any segment is malformed.
    pub fn parse(input: &str) -> DisplayIdResult<Self> {
        let invalid = || DisplayIdError::InvalidInput(input.to_owned());

        let mut parts = input.split('-');
        let prefix = parts.next().ok_or_else(invalid)?;
        let date_part = parts.next().ok_or_else(invalid)?;
        let doctor_part = parts.next().ok_or_else(invalid)?;
        let seq_part = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let kind = DisplayKind::from_prefix(prefix).ok_or_else(invalid)?;

        if NaiveDate::parse_from_str(date_part, "%d%m%Y").is_err() {
            return Err(invalid());
        }

        normalise_strict(doctor_part).map_err(|_| invalid())?;

        if seq_part.len() < 3 || !seq_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence: u32 = seq_part.parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }

        Ok(Self {
            value: input.to_owned(),
            kind,
            sequence,
        })
    }

    /// Returns true if `input` parses as a canonical display identifier.
    pub fn is_canonical(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// What the identifier names.
    pub fn kind(&self) -> DisplayKind {
        self.kind
    }

    /// The 1-based sequence number within the scope.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for DisplayId {
    type Err = DisplayIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayId::parse(s)
    }
}

/// Upper-cases and validates a doctor code.
fn normalise_doctor_code(code: &str) -> DisplayIdResult<String> {
    let trimmed = code.trim().to_ascii_uppercase();
    normalise_strict(&trimmed)?;
    Ok(trimmed)
}

/// Validates a doctor code already expected to be canonical.
fn normalise_strict(code: &str) -> DisplayIdResult<()> {
    if code.is_empty() || code.len() > DisplayId::MAX_DOCTOR_CODE_LEN {
        return Err(DisplayIdError::InvalidInput(code.to_owned()));
    }
    let ok = code.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'Z'));
    if !ok {
        return Err(DisplayIdError::InvalidInput(code.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 2).unwrap()
    }

    #[test]
    fn test_generate_first_in_sequence() {
        let id = DisplayId::generate(DisplayKind::Token, "d01", date(), 1, |_| false).unwrap();

        assert_eq!(id.as_str(), "TKN-02082026-D01-001");
        assert_eq!(id.kind(), DisplayKind::Token);
        assert_eq!(id.sequence(), 1);
    }

    #[test]
    fn test_generate_skips_taken_sequences() {
        let taken = [
            "TKN-02082026-D01-003".to_string(),
            "TKN-02082026-D01-004".to_string(),
        ];
        let id = DisplayId::generate(DisplayKind::Token, "D01", date(), 3, |candidate| {
            taken.contains(&candidate.as_str().to_string())
        })
        .unwrap();

        assert_eq!(id.as_str(), "TKN-02082026-D01-005");
    }

    #[test]
    fn test_generate_slot_prefix() {
        let id = DisplayId::generate(DisplayKind::Slot, "D01", date(), 12, |_| false).unwrap();
        assert_eq!(id.as_str(), "SLT-02082026-D01-012");
    }

    #[test]
    fn test_generate_zero_sequence_starts_at_one() {
        let id = DisplayId::generate(DisplayKind::Token, "D01", date(), 0, |_| false).unwrap();
        assert_eq!(id.sequence(), 1);
    }

    #[test]
    fn test_generate_rejects_bad_doctor_code() {
        let result = DisplayId::generate(DisplayKind::Token, "dr/one", date(), 1, |_| false);
        assert!(matches!(result, Err(DisplayIdError::InvalidInput(_))));

        let result = DisplayId::generate(DisplayKind::Token, "", date(), 1, |_| false);
        assert!(matches!(result, Err(DisplayIdError::InvalidInput(_))));
    }

    #[test]
    fn test_generate_exhausts_with_bound() {
        let result = DisplayId::generate(DisplayKind::Token, "D01", date(), 1, |_| true);
        assert!(matches!(result, Err(DisplayIdError::SequenceExhausted(_))));
    }

    #[test]
    fn test_parse_valid() {
        let id = DisplayId::parse("TKN-02082026-D01-014").unwrap();
        assert_eq!(id.kind(), DisplayKind::Token);
        assert_eq!(id.sequence(), 14);
        assert_eq!(id.to_string(), "TKN-02082026-D01-014");
    }

    #[test]
    fn test_parse_sequence_above_three_digits() {
        let id = DisplayId::parse("TKN-02082026-D01-1024").unwrap();
        assert_eq!(id.sequence(), 1024);
    }

    #[test]
    fn test_parse_rejects_unknown_prefix() {
        assert!(DisplayId::parse("APT-02082026-D01-001").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        assert!(DisplayId::parse("TKN-31022026-D01-001").is_err());
        assert!(DisplayId::parse("TKN-2026-D01-001").is_err());
    }

    #[test]
    fn test_parse_rejects_lowercase_doctor_code() {
        assert!(DisplayId::parse("TKN-02082026-d01-001").is_err());
    }

    #[test]
    fn test_parse_rejects_short_or_zero_sequence() {
        assert!(DisplayId::parse("TKN-02082026-D01-14").is_err());
        assert!(DisplayId::parse("TKN-02082026-D01-000").is_err());
    }

    #[test]
    fn test_parse_rejects_trailing_segment() {
        assert!(DisplayId::parse("TKN-02082026-D01-001-extra").is_err());
    }

    #[test]
    fn test_is_canonical() {
        assert!(DisplayId::is_canonical("SLT-15012027-CARD1-002"));
        assert!(!DisplayId::is_canonical("not-an-id"));
        assert!(!DisplayId::is_canonical(""));
    }

    #[test]
    fn test_round_trip_generate_parse() {
        let original =
            DisplayId::generate(DisplayKind::Slot, "CARD1", date(), 7, |_| false).unwrap();
        let parsed = DisplayId::parse(original.as_str()).unwrap();
        assert_eq!(original, parsed);
    }
}
