//! services/engine/src/sync/connection.rs
//!
//! The single owner of the process-wide realtime channel: its lifecycle
//! state machine, the reconnect backoff policy, and the queue of intents
//! issued while the channel is not open. Consumers observe the state
//! through a watch channel; nothing outside this type touches the
//! transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use praxis_core::domain::ConnectionState;
use praxis_core::events::ClientIntent;
use praxis_core::ports::{EventChannel, EventStream, PortResult};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How an outbound intent left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the open channel.
    Sent,
    /// Queued; it will be flushed once the channel reopens.
    Queued,
}

pub struct ConnectionManager {
    channel: Arc<dyn EventChannel>,
    state_tx: watch::Sender<ConnectionState>,
    pending_intents: Mutex<VecDeque<ClientIntent>>,
    base_delay: Duration,
    max_delay: Duration,
}

impl ConnectionManager {
    pub fn new(
        channel: Arc<dyn EventChannel>,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            channel,
            state_tx,
            pending_intents: Mutex::new(VecDeque::new()),
            base_delay,
            max_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = ?previous, to = ?state, "realtime channel state changed");
        }
    }

    /// Sends an intent when the channel is open; queues it otherwise.
    /// A send failure also queues, since the channel is evidently not as
    /// open as its state claimed.
    pub async fn send_or_queue(&self, intent: ClientIntent) -> SendOutcome {
        if self.state() == ConnectionState::Open {
            match self.channel.send(intent.clone()).await {
                Ok(()) => return SendOutcome::Sent,
                Err(err) => {
                    warn!(error = %err, "intent send failed; queuing and degrading");
                    self.set_state(ConnectionState::Degraded);
                }
            }
        }
        self.pending_intents.lock().await.push_back(intent);
        SendOutcome::Queued
    }

    /// Drains the queue onto a freshly acknowledged channel, in order.
    /// A failure puts the intent back at the front and aborts the flush.
    pub(crate) async fn flush_pending(&self) -> PortResult<()> {
        loop {
            let next = self.pending_intents.lock().await.pop_front();
            let Some(intent) = next else {
                return Ok(());
            };
            if let Err(err) = self.channel.send(intent.clone()).await {
                self.pending_intents.lock().await.push_front(intent);
                return Err(err);
            }
        }
    }

    /// Sends directly, bypassing the queue. Used for the room join that
    /// must precede everything else on a new connection.
    pub(crate) async fn send_now(&self, intent: ClientIntent) -> PortResult<()> {
        self.channel.send(intent).await
    }

    /// Tries `connect` with exponential backoff until it succeeds or the
    /// session shuts down. The adapter resolves only once the server has
    /// acknowledged the subscription, so a returned stream means the
    /// channel can be opened.
    pub(crate) async fn connect_with_backoff(
        &self,
        shutdown: &CancellationToken,
    ) -> Option<EventStream> {
        let mut delay = self.base_delay;
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            self.set_state(ConnectionState::Connecting);
            match self.channel.connect().await {
                Ok(stream) => return Some(stream),
                Err(err) => {
                    warn!(error = %err, retry_in = ?delay, "realtime connect failed");
                    self.set_state(ConnectionState::Degraded);
                    tokio::select! {
                        _ = shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(self.max_delay);
                }
            }
        }
    }
}
