//! crates/praxis_core/src/time.rs
//!
//! Minute-of-day arithmetic and calendar helpers. These are pure value
//! types with no knowledge of stores, the network, or the backend.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Range endpoints live in `[0, 1440]`; `1440` is only valid as an end.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Errors produced when building or parsing time values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("invalid time format '{0}', expected HH:MM")]
    InvalidFormat(String),
    #[error("invalid time range [{0}, {1}): start must come before end within one day")]
    InvalidRange(u16, u16),
}

/// A half-open interval of minutes since midnight: `[start, end)`.
///
/// Touching endpoints do not overlap, so a 9:00-10:00 appointment is
/// compatible with a 10:00-11:00 one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TimeRangeRepr", try_from = "TimeRangeRepr")]
pub struct TimeRange {
    start_minute: u16,
    end_minute: u16,
}

/// Wire shape for `TimeRange`; validated on the way in.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeRangeRepr {
    start_minute: u16,
    end_minute: u16,
}

impl From<TimeRange> for TimeRangeRepr {
    fn from(range: TimeRange) -> Self {
        Self {
            start_minute: range.start_minute,
            end_minute: range.end_minute,
        }
    }
}

impl TryFrom<TimeRangeRepr> for TimeRange {
    type Error = TimeError;

    fn try_from(repr: TimeRangeRepr) -> Result<Self, Self::Error> {
        Self::new(repr.start_minute, repr.end_minute)
    }
}

impl TimeRange {
    /// Builds a validated range. Rejects inverted or degenerate ranges and
    /// endpoints outside the day.
    pub fn new(start_minute: u16, end_minute: u16) -> Result<Self, TimeError> {
        if start_minute >= end_minute || end_minute > MINUTES_PER_DAY {
            return Err(TimeError::InvalidRange(start_minute, end_minute));
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }

    /// Internal constructor for ranges whose invariant is already known to
    /// hold (e.g. gaps cut out of a validated window).
    pub(crate) fn new_unchecked(start_minute: u16, end_minute: u16) -> Self {
        debug_assert!(start_minute < end_minute && end_minute <= MINUTES_PER_DAY);
        Self {
            start_minute,
            end_minute,
        }
    }

    pub fn start_minute(&self) -> u16 {
        self.start_minute
    }

    pub fn end_minute(&self) -> u16 {
        self.end_minute
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end_minute - self.start_minute
    }

    /// True iff `self` lies fully inside `outer`.
    pub fn contained_in(&self, outer: TimeRange) -> bool {
        self.start_minute >= outer.start_minute && self.end_minute <= outer.end_minute
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            format_minutes(self.start_minute),
            format_minutes(self.end_minute)
        )
    }
}

/// The seven weekday labels a weekly schedule is keyed by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// The weekday label of a calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        match date.weekday() {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

/// Parses an `HH:MM` clock time into minutes since midnight.
///
/// `24:00` is accepted so a work window can run to the end of the day.
pub fn parse_time(text: &str) -> Result<u16, TimeError> {
    let invalid = || TimeError::InvalidFormat(text.to_string());
    let (hours_text, minutes_text) = text.split_once(':').ok_or_else(invalid)?;
    let hours: u16 = hours_text.parse().map_err(|_| invalid())?;
    let minutes: u16 = minutes_text.parse().map_err(|_| invalid())?;
    if minutes > 59 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Formats minutes since midnight back into `HH:MM`.
pub fn format_minutes(total_minutes: u16) -> String {
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_clock_times() {
        assert_eq!(parse_time("09:00"), Ok(540));
        assert_eq!(parse_time("18:30"), Ok(1110));
        assert_eq!(parse_time("24:00"), Ok(1440));
        assert_eq!(format_minutes(540), "09:00");
        assert_eq!(format_minutes(1110), "18:30");
    }

    #[test]
    fn rejects_malformed_times() {
        for bad in ["", "9", "09:60", "25:00", "24:01", "ab:cd", "09-00"] {
            assert!(matches!(parse_time(bad), Err(TimeError::InvalidFormat(_))));
        }
    }

    #[test]
    fn range_invariant_is_enforced() {
        assert!(TimeRange::new(540, 1080).is_ok());
        assert!(matches!(
            TimeRange::new(600, 600),
            Err(TimeError::InvalidRange(600, 600))
        ));
        assert!(TimeRange::new(700, 600).is_err());
        assert!(TimeRange::new(0, 1441).is_err());
    }

    #[test]
    fn range_deserialization_rejects_inverted_ranges() {
        let result: Result<TimeRange, _> =
            serde_json::from_str(r#"{"startMinute": 600, "endMinute": 540}"#);
        assert!(result.is_err());

        let range: TimeRange =
            serde_json::from_str(r#"{"startMinute": 540, "endMinute": 1080}"#).unwrap();
        assert_eq!(range.start_minute(), 540);
        assert_eq!(range.end_minute(), 1080);
    }

    #[test]
    fn weekday_of_known_dates() {
        // 2024-12-25 was a Wednesday.
        let date = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        assert_eq!(Weekday::from_date(date), Weekday::Wednesday);
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(Weekday::from_date(monday), Weekday::Monday);
    }
}
