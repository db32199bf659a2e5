//! crates/praxis_core/src/availability.rs
//!
//! The availability query engine: given a weekly schedule, the calendar
//! exceptions, and the appointments already booked on a date, decides
//! whether a candidate slot is bookable and what the open windows are.
//! Everything here is a pure function over data passed in; the stores own
//! the data and call into this module before accepting optimistic writes.

use chrono::NaiveDate;

use crate::conflict::{find_conflicts, overlaps};
use crate::domain::{NonWorkDate, WeeklySchedule};
use crate::time::{TimeRange, Weekday};

/// Minimum appointment duration enforced in the creation flow.
pub const MIN_APPOINTMENT_MINUTES: u16 = 15;

/// Why a candidate slot cannot be booked. These are expected, frequent
/// outcomes and are returned as values, never panics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("the business is closed on this date: {0}")]
    NonWorkingDay(String),
    #[error("no working hours are configured for this weekday")]
    OutsideWeeklySchedule,
    #[error("the requested time falls outside the working hours for this day")]
    OutsideWorkingHours,
    #[error("the requested time overlaps {0:?}")]
    Overlaps(Vec<TimeRange>),
    #[error("appointments must last at least {MIN_APPOINTMENT_MINUTES} minutes")]
    TooShort,
}

/// The work window for `date`, if its weekday is staffed at all.
pub fn working_window(schedule: &WeeklySchedule, date: NaiveDate) -> Option<TimeRange> {
    schedule.window_for(Weekday::from_date(date))
}

/// The first calendar exception applying on `date`, in stored order.
///
/// An exclusion always wins over a configured work window. When several
/// entries match the same date (duplicate recurring holiday plus a one-off
/// override), the first one in stored order is returned.
pub fn exclusion_for(non_work_dates: &[NonWorkDate], date: NaiveDate) -> Option<&NonWorkDate> {
    non_work_dates.iter().find(|entry| entry.applies_on(date))
}

/// Whether `candidate` can be booked on `date`, checked in order:
/// calendar exceptions, weekly schedule, work-window containment, overlap
/// with the appointments already booked that day.
pub fn is_bookable(
    schedule: &WeeklySchedule,
    non_work_dates: &[NonWorkDate],
    booked: &[TimeRange],
    candidate: TimeRange,
    date: NaiveDate,
) -> Result<(), BookingError> {
    if let Some(excluded) = exclusion_for(non_work_dates, date) {
        return Err(BookingError::NonWorkingDay(excluded.reason.clone()));
    }
    let window = working_window(schedule, date).ok_or(BookingError::OutsideWeeklySchedule)?;
    if !candidate.contained_in(window) {
        return Err(BookingError::OutsideWorkingHours);
    }
    let conflicts = find_conflicts(candidate, booked);
    if !conflicts.is_empty() {
        return Err(BookingError::Overlaps(conflicts));
    }
    Ok(())
}

/// The free gaps between booked appointments within the day's work window.
///
/// Returns the whole window when nothing is booked, and nothing when the
/// date is excluded, unstaffed, or fully booked. Booked ranges may arrive
/// unsorted and may overlap each other (optimistic entries racing a
/// refetch); the sweep sorts and merges them first.
pub fn open_windows(
    schedule: &WeeklySchedule,
    non_work_dates: &[NonWorkDate],
    booked: &[TimeRange],
    date: NaiveDate,
) -> Vec<TimeRange> {
    if exclusion_for(non_work_dates, date).is_some() {
        return Vec::new();
    }
    let Some(window) = working_window(schedule, date) else {
        return Vec::new();
    };

    let mut busy: Vec<TimeRange> = booked
        .iter()
        .copied()
        .filter(|range| overlaps(*range, window))
        .collect();
    busy.sort_by_key(TimeRange::start_minute);

    let mut gaps = Vec::new();
    let mut cursor = window.start_minute();
    for range in busy {
        if range.start_minute() > cursor {
            gaps.push(TimeRange::new_unchecked(cursor, range.start_minute()));
        }
        cursor = cursor.max(range.end_minute());
    }
    if cursor < window.end_minute() {
        gaps.push(TimeRange::new_unchecked(cursor, window.end_minute()));
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u16, end: u16) -> TimeRange {
        TimeRange::new(start, end).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Mondays 9:00-18:00, nothing else.
    fn monday_schedule() -> WeeklySchedule {
        let mut weekly = WeeklySchedule::new();
        weekly.set_window(Weekday::Monday, range(540, 1080));
        weekly
    }

    // 2024-12-02 was a Monday.
    const MONDAY: (i32, u32, u32) = (2024, 12, 2);

    fn a_monday() -> NaiveDate {
        date(MONDAY.0, MONDAY.1, MONDAY.2)
    }

    #[test]
    fn rejects_candidate_before_opening() {
        let result = is_bookable(&monday_schedule(), &[], &[], range(480, 540), a_monday());
        assert_eq!(result, Err(BookingError::OutsideWorkingHours));
    }

    #[test]
    fn rejects_unstaffed_weekday() {
        let tuesday = date(2024, 12, 3);
        let result = is_bookable(&monday_schedule(), &[], &[], range(600, 660), tuesday);
        assert_eq!(result, Err(BookingError::OutsideWeeklySchedule));
    }

    #[test]
    fn exclusion_wins_over_work_window() {
        let holiday = NonWorkDate {
            date: a_monday(),
            reason: "Inventory day".to_string(),
            recurrent: false,
        };
        let result = is_bookable(
            &monday_schedule(),
            &[holiday],
            &[],
            range(600, 660),
            a_monday(),
        );
        assert_eq!(
            result,
            Err(BookingError::NonWorkingDay("Inventory day".to_string()))
        );
    }

    #[test]
    fn first_matching_exclusion_wins() {
        let recurring = NonWorkDate {
            date: date(2020, 12, 2),
            reason: "Recurring holiday".to_string(),
            recurrent: true,
        };
        let one_off = NonWorkDate {
            date: a_monday(),
            reason: "One-off override".to_string(),
            recurrent: false,
        };
        let entries = vec![recurring, one_off];
        let matched = exclusion_for(&entries, a_monday()).unwrap();
        assert_eq!(matched.reason, "Recurring holiday");
    }

    #[test]
    fn overlap_beats_everything_else_passing() {
        let booked = vec![range(600, 660)];
        let result = is_bookable(&monday_schedule(), &[], &booked, range(630, 690), a_monday());
        assert_eq!(result, Err(BookingError::Overlaps(vec![range(600, 660)])));

        // Back-to-back with the existing appointment is fine.
        let result = is_bookable(&monday_schedule(), &[], &booked, range(660, 720), a_monday());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn open_windows_over_empty_day_is_the_whole_window() {
        let windows = open_windows(&monday_schedule(), &[], &[], a_monday());
        assert_eq!(windows, vec![range(540, 1080)]);
    }

    #[test]
    fn open_windows_carves_out_booked_slots() {
        let booked = vec![range(540, 600), range(660, 720)];
        let windows = open_windows(&monday_schedule(), &[], &booked, a_monday());
        assert_eq!(windows, vec![range(600, 660), range(720, 1080)]);
    }

    #[test]
    fn open_windows_handles_unsorted_and_overlapping_input() {
        let booked = vec![range(660, 720), range(540, 600), range(600, 680)];
        let windows = open_windows(&monday_schedule(), &[], &booked, a_monday());
        assert_eq!(windows, vec![range(720, 1080)]);
    }

    #[test]
    fn fully_booked_day_has_no_open_windows() {
        let booked = vec![range(540, 1080)];
        assert!(open_windows(&monday_schedule(), &[], &booked, a_monday()).is_empty());
    }

    #[test]
    fn excluded_or_unstaffed_days_have_no_open_windows() {
        let tuesday = date(2024, 12, 3);
        assert!(open_windows(&monday_schedule(), &[], &[], tuesday).is_empty());

        let holiday = NonWorkDate {
            date: a_monday(),
            reason: "Holiday".to_string(),
            recurrent: false,
        };
        assert!(open_windows(&monday_schedule(), &[holiday], &[], a_monday()).is_empty());
    }
}
