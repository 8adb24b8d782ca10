//! Server configuration.

use std::time::Duration;

use opamp_settings::BridgeSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the OpAMP transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (default `"127.0.0.1:0"` for auto-assign).
    pub listen: String,
    /// Name reported by `/health`.
    pub name: String,
    /// Seconds between Ping frames. `None` disables pings.
    pub heartbeat_interval_secs: Option<u64>,
    /// Seconds without inbound traffic before a connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:0".into(),
            name: "opamp-bridge".into(),
            heartbeat_interval_secs: None,
            heartbeat_timeout_secs: 90,
            max_message_size: 4 * 1024 * 1024,
            max_send_queue: 64,
        }
    }
}

impl ServerConfig {
    /// Ping interval, if enabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Allowed silence before a connection is dropped.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl From<&BridgeSettings> for ServerConfig {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            listen: settings.listen.clone(),
            name: settings.name.clone(),
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.heartbeat_timeout_secs,
            max_message_size: settings.max_message_size,
            ..Self::default()
        }
    }
}
