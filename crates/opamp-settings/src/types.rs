//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file only needs to name the values it changes.

use std::collections::BTreeMap;
use std::time::Duration;

use opamp_core::protobufs::ServerCapabilities;
use serde::{Deserialize, Serialize};

/// Prefix carried by the protobuf names of server capabilities.
const CAPABILITY_PREFIX: &str = "ServerCapabilities_";

/// Root settings type for the bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Name this bridge reports in logs and the health endpoint.
    pub name: String,
    /// Socket address the OpAMP listener binds.
    pub listen: String,
    /// Server capabilities declared to agents, by protobuf name.
    pub capabilities: Vec<String>,
    /// Seconds between WebSocket pings. `None` or `0` disables pings.
    pub heartbeat_interval_secs: Option<u64>,
    /// Seconds of silence after which a connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Destinations offered to agents for their own telemetry.
    pub telemetry: TelemetrySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            name: "opamp-bridge".to_string(),
            listen: "0.0.0.0:4320".to_string(),
            capabilities: vec![
                "AcceptsStatus".to_string(),
                "OffersConnectionSettings".to_string(),
                "AcceptsEffectiveConfig".to_string(),
            ],
            heartbeat_interval_secs: Some(30),
            heartbeat_timeout_secs: 90,
            max_message_size: 4 * 1024 * 1024,
            telemetry: TelemetrySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl BridgeSettings {
    /// Ping interval, if pings are enabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Silence allowed before a connection is dropped.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Capability bitmask built from [`Self::capabilities`].
    ///
    /// Unknown names are skipped with a warning.
    pub fn server_capabilities(&self) -> u64 {
        self.capabilities.iter().fold(0, |mask, name| {
            if let Some(cap) = parse_capability(name) {
                mask | cap.bit()
            } else {
                tracing::warn!(capability = %name, "unknown server capability, ignoring");
                mask
            }
        })
    }
}

/// Resolve a capability name, with or without the `ServerCapabilities_` prefix.
pub fn parse_capability(name: &str) -> Option<ServerCapabilities> {
    let name = name.trim();
    let bare = name.strip_prefix(CAPABILITY_PREFIX).unwrap_or(name);
    if bare.is_empty() {
        return None;
    }
    ServerCapabilities::from_str_name(&format!("{CAPABILITY_PREFIX}{bare}"))
        .filter(|cap| *cap != ServerCapabilities::Unspecified)
}

/// One telemetry destination offered to agents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryDestination {
    /// Endpoint URL the agent should export to.
    pub endpoint: String,
    /// Headers the agent should attach.
    pub headers: BTreeMap<String, String>,
}

/// Telemetry destinations offered in connection settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    /// Where agents send their own metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_metrics: Option<TelemetryDestination>,
    /// Where agents send their own traces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_traces: Option<TelemetryDestination>,
    /// Where agents send their own logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_logs: Option<TelemetryDestination>,
    /// Named free-form connection settings.
    pub other_connections: BTreeMap<String, BTreeMap<String, String>>,
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name (case-insensitive, `warning` accepted).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Output format of log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl LogFormat {
    /// Parse a format name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level. `RUST_LOG` takes precedence when set.
    pub level: LogLevel,
    /// Line format.
    pub format: LogFormat,
    /// Per-module overrides, e.g. `opamp_proxy` => `debug`.
    pub module_levels: BTreeMap<String, LogLevel>,
}
