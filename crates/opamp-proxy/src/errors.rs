//! Registry error types.

use opamp_core::{ConnectionId, InstanceId};
use thiserror::Error;

/// Errors from server-initiated pushes to agents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    /// No session is registered for the instance id.
    #[error("agent {0} not found")]
    AgentNotFound(InstanceId),
    /// The agent's connection has gone away.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    /// The connection's outbound queue is full.
    #[error("outbound queue of connection {0} is full")]
    OutboundFull(ConnectionId),
}
