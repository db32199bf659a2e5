//! crates/praxis_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like HTTP clients or
//! realtime transports.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    Appointment, AppointmentDraft, AppointmentPatch, BridgeStatus, BusinessSchedule,
    Conversation, ConversationSummary,
};
use crate::events::{ClientIntent, ServerEvent};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific failures of external collaborators
/// (HTTP client, realtime transport) into the taxonomy the engine acts on.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// Credential rejected. Never retried; surfaced as a session-ended
    /// condition to the enclosing application.
    #[error("Unauthorized")]
    Unauthorized,
    /// The server rejected a write that passed local validation (e.g. a
    /// race with a concurrent booking). The optimistic entry must be
    /// rolled back and the affected window refetched.
    #[error("Rejected by the server: {0}")]
    Conflict(String),
    /// No acknowledgment within the bounded command interval.
    #[error("The operation timed out")]
    Timeout,
    /// Network or channel failure; request/response calls retry a bounded
    /// number of times, the realtime channel runs its reconnect protocol.
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Whether a bounded retry with backoff is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The authoritative backend, consumed request/response. All calls carry
/// the session's bearer credential inside the adapter.
#[async_trait]
pub trait BackendApi: Send + Sync {
    // --- Schedule ---
    async fn fetch_schedule(&self) -> PortResult<BusinessSchedule>;

    async fn replace_schedule(&self, schedule: &BusinessSchedule) -> PortResult<()>;

    // --- Appointments ---
    async fn fetch_appointments(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> PortResult<Vec<Appointment>>;

    async fn create_appointment(&self, draft: &AppointmentDraft) -> PortResult<Appointment>;

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: &AppointmentPatch,
    ) -> PortResult<Appointment>;

    async fn delete_appointment(&self, appointment_id: Uuid) -> PortResult<()>;

    // --- Conversations ---
    async fn fetch_conversations(&self) -> PortResult<Vec<ConversationSummary>>;

    async fn fetch_conversation(&self, conversation_id: &str) -> PortResult<Conversation>;

    // --- WhatsApp bridge ---
    async fn bridge_status(&self) -> PortResult<BridgeStatus>;

    async fn bridge_qr_code(&self) -> PortResult<String>;

    async fn bridge_logout(&self) -> PortResult<()>;
}

/// Server-pushed events as an async stream. The stream ends when the
/// connection drops; the synchronizer then runs its reconnect protocol.
pub type EventStream = Pin<Box<dyn Stream<Item = PortResult<ServerEvent>> + Send>>;

/// The realtime channel. Framing is the adapter's concern; the engine
/// depends only on named events with JSON payloads, delivered
/// at-least-once and unordered across aggregates.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Opens the subscription. Resolves only once the server has
    /// acknowledged the channel, so a successful return is the signal to
    /// leave the degraded state.
    async fn connect(&self) -> PortResult<EventStream>;

    /// Sends an outbound intent. Callers queue intents while the channel
    /// is not open; this is only invoked on an acknowledged connection.
    async fn send(&self, intent: ClientIntent) -> PortResult<()>;
}
