//! Outbound handle for one agent connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opamp_core::ConnectionId;
use opamp_core::protobufs::ServerToAgent;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::errors::ProxyError;

/// A connected agent transport, as seen by the registry.
///
/// The transport owns the socket; this handle only queues messages for its
/// writer task and tracks liveness.
#[derive(Debug)]
pub struct AgentConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the connection's write task.
    tx: mpsc::Sender<ServerToAgent>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// When the last frame (data or pong) was received.
    last_activity: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
}

impl AgentConnection {
    /// Create a new connection handle.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<ServerToAgent>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            last_activity: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a handle with a fresh id plus the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<ServerToAgent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::new(ConnectionId::new(), tx)), rx)
    }

    /// Queue the reply to an agent report, waiting for queue space.
    ///
    /// Replies must not be dropped: a lost `ReportFullState` flag is never
    /// re-requested once the agent's sequence numbers line up again.
    pub async fn send_response(&self, message: ServerToAgent) -> Result<(), ProxyError> {
        self.tx.send(message).await.map_err(|_| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            ProxyError::ConnectionClosed(self.id.clone())
        })
    }

    /// Queue a server-initiated message without waiting.
    pub fn send(&self, message: ServerToAgent) -> Result<(), ProxyError> {
        self.tx.try_send(message).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => ProxyError::OutboundFull(self.id.clone()),
                TrySendError::Closed(_) => ProxyError::ConnectionClosed(self.id.clone()),
            }
        })
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound traffic.
    pub fn mark_active(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound frame (or connection establishment).
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
