//! Shared validated types for the OPD token system.
//!
//! Everything that crosses the system boundary arrives as a string and is
//! validated exactly once, at construction. After that, the wrapper types in
//! this crate guarantee their invariants hold, so downstream code never
//! re-checks formats.
//!
//! Boundary formats:
//! - Dates: `DD-MM-YYYY` (see [`ClinicDate`])
//! - Times of day: `HH:MM`, 24-hour (see [`ClockTime`])

use chrono::{NaiveDate, NaiveTime};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("text cannot be empty")]
    Empty,
    /// The input text exceeded the maximum permitted length
    #[error("text exceeds maximum length of {0} characters")]
    TooLong(usize),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one
/// non-whitespace character. The input is automatically trimmed of leading
/// and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Upper bound on accepted text; generous for names and free-text notes.
    const MAX_LENGTH: usize = 512;

    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(NonEmptyText)` if the trimmed input is non-empty,
    /// or `Err(TextError::Empty)` if it's empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.len() > Self::MAX_LENGTH {
            return Err(TextError::TooLong(Self::MAX_LENGTH));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A syntactically plausible phone number.
///
/// Guarantees:
/// - optional single leading `+`
/// - 7 to 15 digits (ITU E.164 bounds), ignoring spaces and hyphens
/// - no other characters
///
/// The stored form is the compact digit string (with the `+` prefix when
/// supplied); separators from the input are not preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneNumberError {
    Empty,
    InvalidCharacter(char),
    TooFewDigits,
    TooManyDigits,
}

impl fmt::Display for PhoneNumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhoneNumberError::Empty => write!(f, "phone number cannot be empty"),
            PhoneNumberError::InvalidCharacter(c) => {
                write!(f, "phone number contains invalid character '{}'", c)
            }
            PhoneNumberError::TooFewDigits => write!(f, "phone number has fewer than 7 digits"),
            PhoneNumberError::TooManyDigits => write!(f, "phone number has more than 15 digits"),
        }
    }
}

impl std::error::Error for PhoneNumberError {}

impl PhoneNumber {
    const MIN_DIGITS: usize = 7;
    const MAX_DIGITS: usize = 15;

    pub fn parse(input: &str) -> Result<Self, PhoneNumberError> {
        let value = input.trim();

        if value.is_empty() {
            return Err(PhoneNumberError::Empty);
        }

        let mut compact = String::with_capacity(value.len());
        for (i, c) in value.chars().enumerate() {
            match c {
                '+' if i == 0 => compact.push('+'),
                '0'..='9' => compact.push(c),
                ' ' | '-' => {}
                other => return Err(PhoneNumberError::InvalidCharacter(other)),
            }
        }

        let digits = compact.chars().filter(char::is_ascii_digit).count();
        if digits < Self::MIN_DIGITS {
            return Err(PhoneNumberError::TooFewDigits);
        }
        if digits > Self::MAX_DIGITS {
            return Err(PhoneNumberError::TooManyDigits);
        }

        Ok(Self(compact))
    }

    /// Borrow the phone number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PhoneNumber {
    type Err = PhoneNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhoneNumber::parse(s)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for PhoneNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PhoneNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PhoneNumber::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing clinic dates and times.
#[derive(Debug, thiserror::Error)]
pub enum ClinicTimeError {
    /// The date string did not match the `DD-MM-YYYY` boundary format
    #[error("invalid date '{0}': expected DD-MM-YYYY")]
    InvalidDate(String),
    /// The time string did not match the `HH:MM` boundary format
    #[error("invalid time '{0}': expected HH:MM (24-hour)")]
    InvalidTime(String),
    /// The date lies in the past relative to the clinic's current day
    #[error("date {0} is in the past")]
    DateInPast(ClinicDate),
}

/// A clinic calendar date whose boundary representation is `DD-MM-YYYY`.
///
/// Internally this is a plain [`NaiveDate`]; the wrapper pins the parse and
/// display format so every surface of the system renders dates identically.
/// Serde round-trips through the boundary string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClinicDate(NaiveDate);

impl ClinicDate {
    const FORMAT: &'static str = "%d-%m-%Y";

    /// Parses a `DD-MM-YYYY` string into a `ClinicDate`.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicTimeError::InvalidDate`] if the string is malformed or
    /// names an impossible calendar day.
    pub fn parse(input: &str) -> Result<Self, ClinicTimeError> {
        let value = input.trim();
        NaiveDate::parse_from_str(value, Self::FORMAT)
            .map(Self)
            .map_err(|_| ClinicTimeError::InvalidDate(value.to_owned()))
    }

    /// Wraps an already-valid calendar date.
    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Returns the underlying calendar date.
    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// Rejects dates strictly before `today`.
    ///
    /// Validation-layer rule: token requests for past days are refused before
    /// they reach the allocation engine.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicTimeError::DateInPast`] when `self < today`.
    pub fn not_in_past(&self, today: NaiveDate) -> Result<(), ClinicTimeError> {
        if self.0 < today {
            return Err(ClinicTimeError::DateInPast(*self));
        }
        Ok(())
    }
}

impl FromStr for ClinicDate {
    type Err = ClinicTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClinicDate::parse(s)
    }
}

impl fmt::Display for ClinicDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl serde::Serialize for ClinicDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ClinicDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ClinicDate::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A 24-hour wall-clock time whose boundary representation is `HH:MM`.
///
/// Slot start and end times use this type. Seconds are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    const FORMAT: &'static str = "%H:%M";

    /// Parses an `HH:MM` string into a `ClockTime`.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicTimeError::InvalidTime`] if the string is malformed or
    /// out of range.
    pub fn parse(input: &str) -> Result<Self, ClinicTimeError> {
        let value = input.trim();
        NaiveTime::parse_from_str(value, Self::FORMAT)
            .map(Self)
            .map_err(|_| ClinicTimeError::InvalidTime(value.to_owned()))
    }

    /// Wraps an already-valid wall-clock time.
    pub fn from_naive(time: NaiveTime) -> Self {
        Self(time)
    }

    /// Returns the underlying wall-clock time.
    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for ClockTime {
    type Err = ClinicTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClockTime::parse(s)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl serde::Serialize for ClockTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ClockTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ClockTime::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_whitespace() {
        let text = NonEmptyText::new("  Asha Verma  ").unwrap();
        assert_eq!(text.as_str(), "Asha Verma");
    }

    #[test]
    fn test_non_empty_text_rejects_blank() {
        assert!(matches!(NonEmptyText::new("   "), Err(TextError::Empty)));
        assert!(matches!(NonEmptyText::new(""), Err(TextError::Empty)));
    }

    #[test]
    fn test_non_empty_text_rejects_oversized() {
        let long = "x".repeat(600);
        assert!(matches!(
            NonEmptyText::new(long),
            Err(TextError::TooLong(512))
        ));
    }

    #[test]
    fn test_non_empty_text_serde_round_trip() {
        let text = NonEmptyText::new("Asha").unwrap();
        let json = serde_json::to_string(&text).unwrap();
        assert_eq!(json, "\"Asha\"");
        let back: NonEmptyText = serde_json::from_str(&json).unwrap();
        assert_eq!(back, text);
    }

    #[test]
    fn test_non_empty_text_deserialize_rejects_blank() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }

    #[test]
    fn test_phone_number_accepts_separators() {
        let phone = PhoneNumber::parse("+91 98765-43210").unwrap();
        assert_eq!(phone.as_str(), "+919876543210");
    }

    #[test]
    fn test_phone_number_rejects_inner_plus() {
        let result = PhoneNumber::parse("98+76543210");
        assert_eq!(result, Err(PhoneNumberError::InvalidCharacter('+')));
    }

    #[test]
    fn test_phone_number_rejects_letters() {
        let result = PhoneNumber::parse("98765xyz10");
        assert_eq!(result, Err(PhoneNumberError::InvalidCharacter('x')));
    }

    #[test]
    fn test_phone_number_digit_bounds() {
        assert_eq!(
            PhoneNumber::parse("123456"),
            Err(PhoneNumberError::TooFewDigits)
        );
        assert_eq!(
            PhoneNumber::parse("1234567890123456"),
            Err(PhoneNumberError::TooManyDigits)
        );
        assert!(PhoneNumber::parse("1234567").is_ok());
    }

    #[test]
    fn test_clinic_date_parse_valid() {
        let date = ClinicDate::parse("02-08-2026").unwrap();
        assert_eq!(
            date.as_naive(),
            NaiveDate::from_ymd_opt(2026, 8, 2).unwrap()
        );
        assert_eq!(date.to_string(), "02-08-2026");
    }

    #[test]
    fn test_clinic_date_parse_rejects_iso_format() {
        assert!(ClinicDate::parse("2026-08-02").is_err());
    }

    #[test]
    fn test_clinic_date_parse_rejects_impossible_day() {
        assert!(ClinicDate::parse("31-02-2026").is_err());
    }

    #[test]
    fn test_clinic_date_not_in_past() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();
        let yesterday = ClinicDate::parse("01-08-2026").unwrap();
        let same_day = ClinicDate::parse("02-08-2026").unwrap();

        assert!(yesterday.not_in_past(today).is_err());
        assert!(same_day.not_in_past(today).is_ok());
    }

    #[test]
    fn test_clinic_date_serde_round_trip() {
        let date = ClinicDate::parse("15-01-2027").unwrap();
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"15-01-2027\"");
        let back: ClinicDate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, date);
    }

    #[test]
    fn test_clock_time_parse_valid() {
        let time = ClockTime::parse("09:30").unwrap();
        assert_eq!(time.to_string(), "09:30");
    }

    #[test]
    fn test_clock_time_rejects_out_of_range() {
        assert!(ClockTime::parse("24:00").is_err());
        assert!(ClockTime::parse("12:60").is_err());
        assert!(ClockTime::parse("noon").is_err());
    }

    #[test]
    fn test_clock_time_ordering() {
        let nine = ClockTime::parse("09:00").unwrap();
        let ten = ClockTime::parse("10:00").unwrap();
        assert!(nine < ten);
    }
}
