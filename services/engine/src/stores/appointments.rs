//! services/engine/src/stores/appointments.rs
//!
//! The appointment cache, keyed by date. Optimistic mutations are
//! validated against the availability engine before they are accepted, so
//! obviously invalid requests (outside hours, overlapping) fail without a
//! round trip; the server stays the final arbiter and a rejection on
//! reconcile rolls the entry back.

use std::collections::HashMap;

use chrono::NaiveDate;
use praxis_core::availability::{self, BookingError, MIN_APPOINTMENT_MINUTES};
use praxis_core::domain::{Appointment, AppointmentDraft, AppointmentPatch, BusinessSchedule};
use praxis_core::time::TimeRange;
use uuid::Uuid;

use super::{CacheEntry, CacheLookup};

/// Why an optimistic mutation was not applied.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error(transparent)]
    Rejected(#[from] BookingError),
    #[error("appointment {0} is not in the cached window")]
    UnknownAppointment(Uuid),
}

/// What a rollback must undo for one in-flight mutation.
enum PendingMutation {
    Create { date: NaiveDate },
    Update { previous: Appointment },
    Delete { previous: Appointment },
}

pub struct AppointmentStore {
    /// Per-date lists, kept sorted by start minute.
    days: HashMap<NaiveDate, CacheEntry<Vec<Appointment>>>,
    /// In-flight optimistic mutations, keyed by appointment id.
    pending: HashMap<Uuid, PendingMutation>,
}

impl AppointmentStore {
    pub fn new() -> Self {
        Self {
            days: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn day(&self, date: NaiveDate) -> CacheLookup<&[Appointment]> {
        match self.days.get(&date) {
            Some(entry) if entry.is_stale() => CacheLookup::Stale(entry.value()),
            Some(entry) => CacheLookup::Fresh(entry.value()),
            None => CacheLookup::Miss,
        }
    }

    pub fn find(&self, id: Uuid) -> Option<&Appointment> {
        self.days
            .values()
            .flat_map(|entry| entry.value().iter())
            .find(|appointment| appointment.id == id)
    }

    /// The booked ranges on a date, sorted by start. Includes optimistic
    /// entries, so a second optimistic write cannot double-book a slot the
    /// first one already holds.
    pub fn booked_ranges(&self, date: NaiveDate) -> Vec<TimeRange> {
        self.days
            .get(&date)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .map(|appointment| appointment.time_range)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The span of dates currently cached, for gap-recovery refetches.
    pub fn cached_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.days.keys().min()?;
        let last = self.days.keys().max()?;
        Some((*first, *last))
    }

    /// Replaces the `[start, end]` window with the authoritative fetch
    /// result. Pending mutations inside the window are superseded by the
    /// server's view and dropped.
    pub fn reconcile_window(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        appointments: Vec<Appointment>,
    ) {
        let mut by_date: HashMap<NaiveDate, Vec<Appointment>> = HashMap::new();
        for appointment in appointments {
            by_date.entry(appointment.date).or_default().push(appointment);
        }

        let mut date = start;
        while date <= end {
            let mut list = by_date.remove(&date).unwrap_or_default();
            list.sort_by_key(|appointment| appointment.time_range.start_minute());
            match self.days.get_mut(&date) {
                Some(entry) => entry.reconcile(list),
                None => {
                    self.days.insert(date, CacheEntry::fresh(list));
                }
            }
            let Some(next) = date.succ_opt() else { break };
            date = next;
        }

        self.pending.retain(|_, mutation| {
            let date = match mutation {
                PendingMutation::Create { date } => *date,
                PendingMutation::Update { previous } | PendingMutation::Delete { previous } => {
                    previous.date
                }
            };
            date < start || date > end
        });
    }

    /// Validates a new appointment against the schedule and the same-date
    /// bookings, then inserts it tentatively. Returns the local id the
    /// reconcile or rollback must be addressed to.
    pub fn apply_optimistic_create(
        &mut self,
        schedule: &BusinessSchedule,
        business_id: Uuid,
        draft: &AppointmentDraft,
    ) -> Result<Uuid, BookingError> {
        if draft.time_range.duration_minutes() < MIN_APPOINTMENT_MINUTES {
            return Err(BookingError::TooShort);
        }
        let booked = self.booked_ranges(draft.date);
        availability::is_bookable(
            &schedule.weekly,
            &schedule.non_work_dates,
            &booked,
            draft.time_range,
            draft.date,
        )?;

        let local_id = Uuid::new_v4();
        self.insert(Appointment {
            id: local_id,
            business_id,
            client_id: draft.client_id.clone(),
            client_name: draft.client_name.clone(),
            date: draft.date,
            time_range: draft.time_range,
            notes: draft.notes.clone(),
        });
        self.pending
            .insert(local_id, PendingMutation::Create { date: draft.date });
        Ok(local_id)
    }

    /// Swaps the tentative entry for the server's authoritative one.
    pub fn reconcile_create(&mut self, local_id: Uuid, confirmed: Appointment) {
        self.remove_by_id(local_id);
        self.pending.remove(&local_id);
        self.insert(confirmed);
    }

    /// Applies a patch tentatively, re-validating the new slot with the
    /// patched appointment itself excluded from the conflict scan.
    pub fn apply_optimistic_update(
        &mut self,
        schedule: &BusinessSchedule,
        id: Uuid,
        patch: &AppointmentPatch,
    ) -> Result<(), MutationError> {
        let previous = self
            .remove_by_id(id)
            .ok_or(MutationError::UnknownAppointment(id))?;

        let mut updated = previous.clone();
        if let Some(date) = patch.date {
            updated.date = date;
        }
        if let Some(time_range) = patch.time_range {
            updated.time_range = time_range;
        }
        if let Some(notes) = &patch.notes {
            updated.notes = Some(notes.clone());
        }

        let booked = self.booked_ranges(updated.date);
        let verdict = availability::is_bookable(
            &schedule.weekly,
            &schedule.non_work_dates,
            &booked,
            updated.time_range,
            updated.date,
        );
        if let Err(rejection) = verdict {
            self.insert(previous);
            return Err(rejection.into());
        }

        self.insert(updated);
        self.pending.insert(id, PendingMutation::Update { previous });
        Ok(())
    }

    pub fn reconcile_update(&mut self, id: Uuid, confirmed: Appointment) {
        self.remove_by_id(id);
        self.pending.remove(&id);
        self.insert(confirmed);
    }

    /// Removes an appointment tentatively, keeping it for rollback.
    pub fn apply_optimistic_delete(&mut self, id: Uuid) -> Result<(), MutationError> {
        let previous = self
            .remove_by_id(id)
            .ok_or(MutationError::UnknownAppointment(id))?;
        self.pending.insert(id, PendingMutation::Delete { previous });
        Ok(())
    }

    pub fn reconcile_delete(&mut self, id: Uuid) {
        self.pending.remove(&id);
    }

    /// Undoes whatever the pending mutation changed locally.
    pub fn rollback(&mut self, id: Uuid) {
        match self.pending.remove(&id) {
            Some(PendingMutation::Create { .. }) => {
                self.remove_by_id(id);
            }
            Some(PendingMutation::Update { previous }) => {
                self.remove_by_id(id);
                self.insert(previous);
            }
            Some(PendingMutation::Delete { previous }) => {
                self.insert(previous);
            }
            None => {}
        }
    }

    pub fn invalidate(&mut self, date: NaiveDate) {
        if let Some(entry) = self.days.get_mut(&date) {
            entry.mark_stale();
        }
    }

    pub fn invalidate_all(&mut self) {
        for entry in self.days.values_mut() {
            entry.mark_stale();
        }
    }

    fn insert(&mut self, appointment: Appointment) {
        let entry = self.days.entry(appointment.date).or_insert_with(|| {
            // A day materialized by an optimistic write was never fetched,
            // so it starts stale.
            let mut entry = CacheEntry::fresh(Vec::new());
            entry.mark_stale();
            entry
        });
        let list = entry.value_mut();
        let index = list.partition_point(|existing| {
            existing.time_range.start_minute() <= appointment.time_range.start_minute()
        });
        list.insert(index, appointment);
    }

    fn remove_by_id(&mut self, id: Uuid) -> Option<Appointment> {
        for entry in self.days.values_mut() {
            if let Some(position) = entry.value().iter().position(|a| a.id == id) {
                return Some(entry.value_mut().remove(position));
            }
        }
        None
    }
}

impl Default for AppointmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_core::time::Weekday;

    fn range(start: u16, end: u16) -> TimeRange {
        TimeRange::new(start, end).unwrap()
    }

    // 2024-12-02 was a Monday.
    fn a_monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 2).unwrap()
    }

    fn monday_schedule() -> BusinessSchedule {
        let mut schedule = BusinessSchedule::default();
        schedule
            .weekly
            .set_window(Weekday::Monday, range(540, 1080));
        schedule
    }

    fn draft(start: u16, end: u16) -> AppointmentDraft {
        AppointmentDraft {
            client_id: "5544998877@c.us".to_string(),
            client_name: Some("Ana".to_string()),
            date: a_monday(),
            time_range: range(start, end),
            notes: None,
        }
    }

    fn confirmed(id: Uuid, start: u16, end: u16) -> Appointment {
        Appointment {
            id,
            business_id: Uuid::nil(),
            client_id: "5544998877@c.us".to_string(),
            client_name: Some("Ana".to_string()),
            date: a_monday(),
            time_range: range(start, end),
            notes: None,
        }
    }

    #[test]
    fn optimistic_create_validates_before_accepting() {
        let mut store = AppointmentStore::new();
        let schedule = monday_schedule();

        let too_short = draft(600, 610);
        assert!(matches!(
            store.apply_optimistic_create(&schedule, Uuid::nil(), &too_short),
            Err(BookingError::TooShort)
        ));

        let outside = draft(480, 540);
        assert!(matches!(
            store.apply_optimistic_create(&schedule, Uuid::nil(), &outside),
            Err(BookingError::OutsideWorkingHours)
        ));

        let first = store
            .apply_optimistic_create(&schedule, Uuid::nil(), &draft(600, 660))
            .unwrap();

        // A second optimistic write cannot take the same slot.
        assert!(matches!(
            store.apply_optimistic_create(&schedule, Uuid::nil(), &draft(630, 690)),
            Err(BookingError::Overlaps(_))
        ));

        store.rollback(first);
        assert!(store.booked_ranges(a_monday()).is_empty());
    }

    #[test]
    fn reconcile_create_swaps_local_entry_for_server_one() {
        let mut store = AppointmentStore::new();
        let local_id = store
            .apply_optimistic_create(&monday_schedule(), Uuid::nil(), &draft(600, 660))
            .unwrap();

        let server_id = Uuid::new_v4();
        store.reconcile_create(local_id, confirmed(server_id, 600, 660));

        assert!(store.find(local_id).is_none());
        assert!(store.find(server_id).is_some());
    }

    #[test]
    fn update_rolls_back_to_previous_slot() {
        let mut store = AppointmentStore::new();
        let schedule = monday_schedule();
        let id = Uuid::new_v4();
        store.reconcile_window(a_monday(), a_monday(), vec![confirmed(id, 600, 660)]);

        let patch = AppointmentPatch {
            time_range: Some(range(720, 780)),
            ..AppointmentPatch::default()
        };
        store.apply_optimistic_update(&schedule, id, &patch).unwrap();
        assert_eq!(store.booked_ranges(a_monday()), vec![range(720, 780)]);

        store.rollback(id);
        assert_eq!(store.booked_ranges(a_monday()), vec![range(600, 660)]);
    }

    #[test]
    fn update_excludes_itself_from_the_conflict_scan() {
        let mut store = AppointmentStore::new();
        let schedule = monday_schedule();
        let id = Uuid::new_v4();
        store.reconcile_window(a_monday(), a_monday(), vec![confirmed(id, 600, 660)]);

        // Nudging the appointment into its own old slot must pass.
        let patch = AppointmentPatch {
            time_range: Some(range(630, 690)),
            ..AppointmentPatch::default()
        };
        assert!(store.apply_optimistic_update(&schedule, id, &patch).is_ok());
    }

    #[test]
    fn delete_rollback_restores_the_appointment() {
        let mut store = AppointmentStore::new();
        let id = Uuid::new_v4();
        store.reconcile_window(a_monday(), a_monday(), vec![confirmed(id, 600, 660)]);

        store.apply_optimistic_delete(id).unwrap();
        assert!(store.booked_ranges(a_monday()).is_empty());

        store.rollback(id);
        assert_eq!(store.booked_ranges(a_monday()), vec![range(600, 660)]);
    }

    #[test]
    fn reconcile_window_supersedes_pending_and_sorts() {
        let mut store = AppointmentStore::new();
        let local_id = store
            .apply_optimistic_create(&monday_schedule(), Uuid::nil(), &draft(600, 660))
            .unwrap();

        let authoritative = vec![
            confirmed(Uuid::new_v4(), 720, 780),
            confirmed(Uuid::new_v4(), 540, 600),
        ];
        store.reconcile_window(a_monday(), a_monday(), authoritative);

        // The server's view wins: the tentative entry is gone and a late
        // rollback of the superseded mutation is a no-op.
        assert_eq!(
            store.booked_ranges(a_monday()),
            vec![range(540, 600), range(720, 780)]
        );
        store.rollback(local_id);
        assert_eq!(
            store.booked_ranges(a_monday()),
            vec![range(540, 600), range(720, 780)]
        );
        assert!(store.day(a_monday()).is_fresh());
    }

    #[test]
    fn invalidation_marks_days_stale_but_keeps_values() {
        let mut store = AppointmentStore::new();
        let id = Uuid::new_v4();
        store.reconcile_window(a_monday(), a_monday(), vec![confirmed(id, 600, 660)]);

        store.invalidate_all();
        assert!(matches!(store.day(a_monday()), CacheLookup::Stale(_)));
        assert_eq!(store.booked_ranges(a_monday()), vec![range(600, 660)]);
    }
}
