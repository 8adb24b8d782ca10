//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Bridge name.
    pub name: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Registered agents.
    pub agents: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, name: &str, connections: usize, agents: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        name: name.to_string(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        agents,
    }
}
