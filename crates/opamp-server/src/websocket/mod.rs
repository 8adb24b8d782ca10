//! WebSocket transport: per-agent sessions, framing, and liveness pings.

pub mod heartbeat;
pub mod session;
