//! services/engine/src/stores/mod.rs
//!
//! Owning, in-memory views of the authoritative server state. Every entry
//! carries an explicit staleness flag; events and reconnects flip the flag,
//! fetches clear it. Stores are mutated only through their own methods, and
//! only by commands and the event synchronizer.

pub mod appointments;
pub mod conversations;
pub mod schedule;

use tokio::sync::Mutex;

pub use appointments::AppointmentStore;
pub use conversations::{ConversationStore, MessageApplied};
pub use schedule::ScheduleStore;

/// A cached aggregate plus its staleness flag.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    value: T,
    stale: bool,
}

impl<T> CacheEntry<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            stale: false,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Replaces the cached value with an authoritative one.
    pub fn reconcile(&mut self, value: T) {
        self.value = value;
        self.stale = false;
    }
}

/// What a synchronous store lookup produced. `Stale` still carries the
/// old value so the UI can render immediately while a refetch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Fresh(T),
    Stale(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn cached(self) -> Option<T> {
        match self {
            Self::Fresh(value) | Self::Stale(value) => Some(value),
            Self::Miss => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// All stores of one engine session, each behind its own lock so every
/// store has a single logical writer.
pub struct StoreRegistry {
    pub schedule: Mutex<ScheduleStore>,
    pub appointments: Mutex<AppointmentStore>,
    pub conversations: Mutex<ConversationStore>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self {
            schedule: Mutex::new(ScheduleStore::new()),
            appointments: Mutex::new(AppointmentStore::new()),
            conversations: Mutex::new(ConversationStore::new()),
        }
    }

    /// Marks every cached aggregate stale. Run when the realtime channel
    /// drops: an unbounded number of events may have been missed, and no
    /// catch-up log exists, so nothing cached can be trusted.
    pub async fn invalidate_all(&self) {
        self.schedule.lock().await.invalidate();
        self.appointments.lock().await.invalidate_all();
        self.conversations.lock().await.invalidate_all();
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
