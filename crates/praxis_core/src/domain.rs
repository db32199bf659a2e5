//! crates/praxis_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any transport or rendering concern;
//! the serde derives describe the backend's JSON wire shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::{TimeRange, Weekday};

/// A calendar exception (holiday or closure). When `recurrent` is set the
/// (month, day) pair recurs every year regardless of the stored year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonWorkDate {
    pub date: NaiveDate,
    pub reason: String,
    pub recurrent: bool,
}

impl NonWorkDate {
    /// Whether this exclusion applies on `candidate`.
    pub fn applies_on(&self, candidate: NaiveDate) -> bool {
        if self.recurrent {
            self.date.month() == candidate.month() && self.date.day() == candidate.day()
        } else {
            self.date == candidate
        }
    }
}

/// The staffed work window per weekday. A missing key means the business
/// does not work that day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule {
    windows: BTreeMap<Weekday, TimeRange>,
}

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_window(&mut self, weekday: Weekday, window: TimeRange) {
        self.windows.insert(weekday, window);
    }

    pub fn clear_window(&mut self, weekday: Weekday) {
        self.windows.remove(&weekday);
    }

    pub fn window_for(&self, weekday: Weekday) -> Option<TimeRange> {
        self.windows.get(&weekday).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, TimeRange)> + '_ {
        self.windows.iter().map(|(weekday, window)| (*weekday, *window))
    }
}

/// The full schedule aggregate owned by a business: weekly work windows
/// plus the ordered list of calendar exceptions. The stored order of
/// `non_work_dates` is the display order and the tie-break order when
/// several entries match the same date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessSchedule {
    pub weekly: WeeklySchedule,
    pub non_work_dates: Vec<NonWorkDate>,
}

/// A confirmed or tentative booking of one client with one business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub business_id: Uuid,
    pub client_id: String,
    pub client_name: Option<String>,
    pub date: NaiveDate,
    pub time_range: TimeRange,
    pub notes: Option<String>,
}

/// The client-supplied fields of a new appointment; the server assigns the
/// identity and the business on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDraft {
    pub client_id: String,
    pub client_name: Option<String>,
    pub date: NaiveDate,
    pub time_range: TimeRange,
    pub notes: Option<String>,
}

/// A partial update to an existing appointment. Absent fields are left
/// unchanged by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Who authored a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human client, writing over WhatsApp.
    User,
    /// The AI assistant answering on the business's behalf.
    Assistant,
    /// The business user typing in the dashboard.
    Business,
}

/// Delivery state of an outbound message, as reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Media attached to a message; the content itself stays on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachment {
    pub url: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// An emoji reaction left on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub sender_id: String,
}

/// A single message in a conversation. Identity is the `id` field;
/// `timestamp` orders messages for display but is not assumed to be
/// monotonic in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: MessageRole,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
}

/// A chat thread between one client and one business, fed by the client,
/// the AI assistant, and the business user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub client_id: String,
    pub business_id: Uuid,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub new_client_messages_count: u32,
}

/// The conversation-list view: everything but the message history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub client_id: String,
    pub business_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub new_client_messages_count: u32,
}

/// Lifecycle of the realtime channel, process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Degraded,
    Closed,
}

/// Pairing status of the WhatsApp bridge. Only `Ready` is semantically
/// meaningful to the engine; statuses this build does not know collapse to
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    Booting,
    LoadingScreen,
    Qr,
    Ready,
    Authenticated,
    AuthFailure,
    #[serde(other)]
    Disconnected,
}

impl BridgeStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn recurrent_exclusion_matches_across_years() {
        let christmas = NonWorkDate {
            date: date(2024, 12, 25),
            reason: "Christmas".to_string(),
            recurrent: true,
        };
        assert!(christmas.applies_on(date(2025, 12, 25)));
        assert!(christmas.applies_on(date(2024, 12, 25)));
        assert!(!christmas.applies_on(date(2025, 12, 24)));
    }

    #[test]
    fn one_off_exclusion_matches_exact_date_only() {
        let closure = NonWorkDate {
            date: date(2024, 12, 25),
            reason: "One-off closure".to_string(),
            recurrent: false,
        };
        assert!(closure.applies_on(date(2024, 12, 25)));
        assert!(!closure.applies_on(date(2025, 12, 25)));
    }

    #[test]
    fn weekly_schedule_roundtrips_with_weekday_labels() {
        let mut weekly = WeeklySchedule::new();
        weekly.set_window(Weekday::Monday, TimeRange::new(540, 1080).unwrap());

        let json = serde_json::to_string(&weekly).unwrap();
        assert!(json.contains("MONDAY"));

        let parsed: WeeklySchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, weekly);
        assert!(parsed.window_for(Weekday::Tuesday).is_none());
    }

    #[test]
    fn unknown_bridge_status_collapses_to_disconnected() {
        let status: BridgeStatus = serde_json::from_str(r#""some_future_state""#).unwrap();
        assert_eq!(status, BridgeStatus::Disconnected);
        let ready: BridgeStatus = serde_json::from_str(r#""ready""#).unwrap();
        assert!(ready.is_ready());
    }
}
