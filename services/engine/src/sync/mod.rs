//! services/engine/src/sync/mod.rs
//!
//! The realtime half of the engine: the connection manager owning the
//! channel's state machine and intent queue, and the synchronizer that
//! applies the pushed event stream to the stores.

pub mod connection;
pub mod synchronizer;

pub use connection::{ConnectionManager, SendOutcome};
pub use synchronizer::EventSynchronizer;

use uuid::Uuid;

/// Side-channel alerts whose entire purpose is to be shown to the user.
/// They never mutate domain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The assistant could not complete an action in a conversation.
    AssistantFailed { conversation_id: String },
    /// WhatsApp-bridge pairing status changed (QR payload for display).
    BridgeQr { payload: String },
    /// The WhatsApp bridge finished pairing.
    BridgeReady,
    /// The server confirmed a bulk assistant toggle.
    AssistantsToggled { user_id: Uuid, enabled: bool },
}

/// A refetch the synchronizer scheduled without blocking the event loop.
/// The session's refetch worker performs the fetch and reconciles the
/// result; duplicates are harmless since reconciling is idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefetchTarget {
    Schedule,
    /// The whole cached appointment window.
    Appointments,
    ConversationList,
    Conversation(String),
}
