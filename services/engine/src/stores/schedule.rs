//! services/engine/src/stores/schedule.rs
//!
//! The single schedule aggregate (weekly work windows + calendar
//! exceptions), with optimistic replace for the schedule-update command.

use praxis_core::domain::BusinessSchedule;

use super::{CacheEntry, CacheLookup};

pub struct ScheduleStore {
    entry: Option<CacheEntry<BusinessSchedule>>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self { entry: None }
    }

    pub fn get(&self) -> CacheLookup<&BusinessSchedule> {
        match &self.entry {
            Some(entry) if entry.is_stale() => CacheLookup::Stale(entry.value()),
            Some(entry) => CacheLookup::Fresh(entry.value()),
            None => CacheLookup::Miss,
        }
    }

    /// Replaces the cached schedule with the authoritative one.
    pub fn reconcile(&mut self, schedule: BusinessSchedule) {
        match &mut self.entry {
            Some(entry) => entry.reconcile(schedule),
            None => self.entry = Some(CacheEntry::fresh(schedule)),
        }
    }

    /// Applies a local schedule replacement before the round trip and
    /// returns the previous value for a possible rollback.
    pub fn apply_optimistic(&mut self, schedule: BusinessSchedule) -> Option<BusinessSchedule> {
        let previous = self.entry.as_ref().map(|entry| entry.value().clone());
        self.reconcile(schedule);
        previous
    }

    /// Restores the value captured by `apply_optimistic` and marks it
    /// stale, since the failed write leaves the authoritative state
    /// uncertain.
    pub fn rollback(&mut self, previous: Option<BusinessSchedule>) {
        self.entry = previous.map(|schedule| {
            let mut entry = CacheEntry::fresh(schedule);
            entry.mark_stale();
            entry
        });
    }

    pub fn invalidate(&mut self) {
        if let Some(entry) = &mut self.entry {
            entry.mark_stale();
        }
    }
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}
