//! services/engine/src/sync/synchronizer.rs
//!
//! The long-lived consumer of the server's event stream. Each event is
//! identified, classified as a direct patch or a cache invalidation, and
//! applied without ever waiting on the network: fetching happens on the
//! session's refetch worker, never on this loop.

use std::sync::Arc;

use futures::StreamExt;
use praxis_core::domain::ConnectionState;
use praxis_core::events::{ClientIntent, ServerEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::connection::ConnectionManager;
use super::{Notification, RefetchTarget};
use crate::stores::{MessageApplied, StoreRegistry};

pub struct EventSynchronizer {
    business_id: Uuid,
    stores: Arc<StoreRegistry>,
    connection: Arc<ConnectionManager>,
    notifications: mpsc::UnboundedSender<Notification>,
    refetch: mpsc::UnboundedSender<RefetchTarget>,
}

impl EventSynchronizer {
    pub fn new(
        business_id: Uuid,
        stores: Arc<StoreRegistry>,
        connection: Arc<ConnectionManager>,
        notifications: mpsc::UnboundedSender<Notification>,
        refetch: mpsc::UnboundedSender<RefetchTarget>,
    ) -> Self {
        Self {
            business_id,
            stores,
            connection,
            notifications,
            refetch,
        }
    }

    /// Runs until the session shuts down. Each pass connects with backoff,
    /// joins the business room, replays queued intents, then pumps events.
    ///
    /// A dropped stream means an unknown number of events were missed and
    /// no catch-up log exists, so every cached aggregate is invalidated
    /// before resubscribing.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut reconnecting = false;
        loop {
            if reconnecting {
                self.stores.invalidate_all().await;
                self.schedule_gap_recovery().await;
            }
            let Some(mut stream) = self.connection.connect_with_backoff(&shutdown).await else {
                break;
            };

            let join = ClientIntent::JoinBusinessRoom {
                business_id: self.business_id,
            };
            if let Err(err) = self.connection.send_now(join).await {
                warn!(error = %err, "failed to join business room; reconnecting");
                self.connection.set_state(ConnectionState::Closed);
                reconnecting = true;
                continue;
            }
            if let Err(err) = self.connection.flush_pending().await {
                warn!(error = %err, "failed to flush queued intents; reconnecting");
                self.connection.set_state(ConnectionState::Closed);
                reconnecting = true;
                continue;
            }
            self.connection.set_state(ConnectionState::Open);
            info!("realtime channel open");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        self.connection.set_state(ConnectionState::Closed);
                        return;
                    }
                    item = stream.next() => match item {
                        Some(Ok(event)) => self.dispatch(event).await,
                        Some(Err(err)) => {
                            error!(error = %err, "realtime channel failed");
                            break;
                        }
                        None => {
                            info!("realtime channel closed by server");
                            break;
                        }
                    }
                }
            }
            self.connection.set_state(ConnectionState::Closed);
            reconnecting = true;
        }
        self.connection.set_state(ConnectionState::Closed);
    }

    /// Applies one decoded event: a direct patch for self-describing
    /// payloads, a staleness flag plus queued refetch for everything else,
    /// a notification for side-channel alerts. Re-delivery of the same
    /// message id is a no-op.
    async fn dispatch(&self, event: ServerEvent) {
        debug!(?event, "dispatching server event");
        match event {
            ServerEvent::NewClientMessage {
                conversation_id,
                message,
            } => {
                let applied = self
                    .stores
                    .conversations
                    .lock()
                    .await
                    .apply_message(&conversation_id, message);
                match applied {
                    MessageApplied::Inserted => {}
                    MessageApplied::Merged => {
                        debug!(%conversation_id, "duplicate message delivery merged");
                    }
                    MessageApplied::Uncached => {
                        // Never patch an aggregate we do not hold.
                        self.request_refetch(RefetchTarget::Conversation(conversation_id));
                        self.request_refetch(RefetchTarget::ConversationList);
                    }
                }
            }
            ServerEvent::AssistantFailed { conversation_id } => {
                self.notify(Notification::AssistantFailed { conversation_id });
            }
            ServerEvent::NewAppointmentCreated {} => {
                // Payload-free by contract: the appointment contents are
                // never guessed from the event, the window is refetched.
                self.stores.appointments.lock().await.invalidate_all();
                self.request_refetch(RefetchTarget::Appointments);
            }
            ServerEvent::QrStatus { payload } => {
                self.notify(Notification::BridgeQr { payload });
            }
            ServerEvent::Ready {} => {
                self.notify(Notification::BridgeReady);
            }
            ServerEvent::EnableAllAssistants { user_id } => {
                self.apply_assistants_toggle(user_id, true).await;
            }
            ServerEvent::DisableAllAssistants { user_id } => {
                self.apply_assistants_toggle(user_id, false).await;
            }
        }
    }

    async fn apply_assistants_toggle(&self, user_id: Uuid, enabled: bool) {
        self.stores.conversations.lock().await.invalidate_all();
        self.request_refetch(RefetchTarget::ConversationList);
        self.notify(Notification::AssistantsToggled { user_id, enabled });
    }

    /// Queues refetches for everything currently held, after a gap in the
    /// stream.
    async fn schedule_gap_recovery(&self) {
        if self.stores.schedule.lock().await.get().cached().is_some() {
            self.request_refetch(RefetchTarget::Schedule);
        }
        if self.stores.appointments.lock().await.cached_span().is_some() {
            self.request_refetch(RefetchTarget::Appointments);
        }
        let conversations = self.stores.conversations.lock().await;
        if conversations.summaries().cached().is_some() {
            self.request_refetch(RefetchTarget::ConversationList);
        }
        for conversation_id in conversations.cached_ids() {
            self.request_refetch(RefetchTarget::Conversation(conversation_id));
        }
    }

    fn request_refetch(&self, target: RefetchTarget) {
        if self.refetch.send(target).is_err() {
            debug!("refetch worker gone; session is shutting down");
        }
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("notification receiver dropped");
        }
    }
}
