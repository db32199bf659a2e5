//! crates/praxis_core/src/events.rs
//!
//! The realtime channel vocabulary: events pushed by the server and the
//! intents the dashboard sends back. Both sides are tagged unions decoded
//! exactly once at the channel boundary, so downstream dispatch is
//! exhaustive and checked by the compiler.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Message;

/// An event pushed from the server. Delivery is at-least-once and ordering
/// is only guaranteed within a single aggregate, never across aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A message created on the client or assistant side of a conversation.
    /// Carries the full message, so it can be patched into the local view.
    #[serde(rename_all = "camelCase")]
    NewClientMessage {
        conversation_id: String,
        message: Message,
    },

    /// The assistant could not complete an action in a conversation.
    /// Side-channel alert only; never mutates domain state.
    #[serde(rename_all = "camelCase")]
    AssistantFailed { conversation_id: String },

    /// An appointment was created by a non-local actor (e.g. the assistant
    /// booked a slot). Carries no payload: the local appointment view must
    /// be refetched, never guessed.
    NewAppointmentCreated {},

    /// WhatsApp-bridge pairing status changed.
    QrStatus { payload: String },

    /// The WhatsApp bridge finished pairing.
    Ready {},

    /// The server confirms a bulk assistant enable.
    #[serde(rename_all = "camelCase")]
    EnableAllAssistants { user_id: Uuid },

    /// The server confirms a bulk assistant disable.
    #[serde(rename_all = "camelCase")]
    DisableAllAssistants { user_id: Uuid },
}

/// An outbound intent from the dashboard to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientIntent {
    /// The business user sends a chat message.
    #[serde(rename_all = "camelCase")]
    NewBusinessMessage {
        conversation_id: String,
        message: Message,
    },

    /// Subscribe this session to the business's event room. Sent once per
    /// (re)connection, before anything else.
    #[serde(rename_all = "camelCase")]
    JoinBusinessRoom { business_id: Uuid },

    #[serde(rename_all = "camelCase")]
    EnableAllAssistants { user_id: Uuid },

    #[serde(rename_all = "camelCase")]
    DisableAllAssistants { user_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRole;

    #[test]
    fn server_events_decode_from_wire_names() {
        let json = r#"{
            "type": "newClientMessage",
            "conversationId": "554499887766@c.us",
            "message": {
                "id": "wamid.1",
                "content": "hello",
                "role": "user",
                "timestamp": "2024-12-02T12:00:00Z"
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::NewClientMessage {
                conversation_id,
                message,
            } => {
                assert_eq!(conversation_id, "554499887766@c.us");
                assert_eq!(message.id, "wamid.1");
                assert_eq!(message.role, MessageRole::User);
                assert!(message.reactions.is_empty());
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }

        let bare: ServerEvent = serde_json::from_str(r#"{"type": "ready"}"#).unwrap();
        assert_eq!(bare, ServerEvent::Ready {});

        let created: ServerEvent =
            serde_json::from_str(r#"{"type": "newAppointmentCreated"}"#).unwrap();
        assert_eq!(created, ServerEvent::NewAppointmentCreated {});
    }

    #[test]
    fn unknown_event_names_fail_to_decode() {
        let result: Result<ServerEvent, _> =
            serde_json::from_str(r#"{"type": "somethingElse"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn intents_serialize_with_wire_names() {
        let intent = ClientIntent::JoinBusinessRoom {
            business_id: Uuid::nil(),
        };
        let json = serde_json::to_string(&intent).unwrap();
        assert!(json.contains(r#""type":"joinBusinessRoom""#));
        assert!(json.contains("businessId"));
    }
}
