//! services/engine/src/adapters/channel.rs
//!
//! An `EventChannel` over in-process queues. Embedding hosts that bring
//! their own transport framing decode frames into `ServerEvent`s and feed
//! them through the handle; the integration tests drive it the same way.
//! `connect` acknowledges immediately, which stands in for the server-side
//! channel ack a network adapter would wait for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use praxis_core::events::{ClientIntent, ServerEvent};
use praxis_core::ports::{EventChannel, EventStream, PortError, PortResult};
use tokio::sync::{mpsc, Mutex};

struct ChannelShared {
    reachable: AtomicBool,
    /// Feed for the currently active subscription, if any.
    feed: Mutex<Option<mpsc::UnboundedSender<PortResult<ServerEvent>>>>,
    /// Every intent the engine has sent.
    sent: Mutex<Vec<ClientIntent>>,
}

/// The engine-facing end: implements the `EventChannel` port.
pub struct InProcessChannel {
    shared: Arc<ChannelShared>,
}

/// The host-facing end: pushes events, simulates drops, inspects intents.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<ChannelShared>,
}

impl InProcessChannel {
    pub fn new() -> (Self, ChannelHandle) {
        let shared = Arc::new(ChannelShared {
            reachable: AtomicBool::new(true),
            feed: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        });
        (
            Self {
                shared: shared.clone(),
            },
            ChannelHandle { shared },
        )
    }
}

#[async_trait]
impl EventChannel for InProcessChannel {
    async fn connect(&self) -> PortResult<EventStream> {
        if !self.shared.reachable.load(Ordering::SeqCst) {
            return Err(PortError::Transport("server unreachable".to_string()));
        }
        let (feed, mut stream_rx) = mpsc::unbounded_channel();
        *self.shared.feed.lock().await = Some(feed);
        Ok(Box::pin(futures::stream::poll_fn(move |cx| {
            stream_rx.poll_recv(cx)
        })))
    }

    async fn send(&self, intent: ClientIntent) -> PortResult<()> {
        if !self.shared.reachable.load(Ordering::SeqCst) {
            return Err(PortError::Transport("server unreachable".to_string()));
        }
        self.shared.sent.lock().await.push(intent);
        Ok(())
    }
}

impl ChannelHandle {
    /// Pushes one decoded event to the engine. Returns false when no
    /// subscription is active.
    pub async fn emit(&self, event: ServerEvent) -> bool {
        match &*self.shared.feed.lock().await {
            Some(feed) => feed.send(Ok(event)).is_ok(),
            None => false,
        }
    }

    /// Ends the current stream, exactly as a dropped connection would.
    pub async fn disconnect(&self) {
        self.shared.feed.lock().await.take();
    }

    /// Whether a subscription is currently active.
    pub async fn is_subscribed(&self) -> bool {
        self.shared.feed.lock().await.is_some()
    }

    /// Controls whether future connects and sends succeed.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// The intents the engine has sent so far, in order.
    pub async fn sent_intents(&self) -> Vec<ClientIntent> {
        self.shared.sent.lock().await.clone()
    }
}
