//! # opamp-proxy
//!
//! Transport-independent heart of the bridge:
//!
//! - [`OpAmpProxy`]: registry of agents keyed by instance id, fed by
//!   connection lifecycle callbacks
//! - [`Agent`]: per-agent status merge and full-state resync decisions
//! - [`ConnectionSettingsCalculator`]: hashed connection settings offers
//! - [`FleetQuery`]: read-only snapshots plus a coalescing change signal

#![deny(unsafe_code)]

pub mod agent;
pub mod connection;
pub mod connection_settings;
pub mod errors;
pub mod fleet;
pub mod proxy;

pub use agent::{Agent, AgentStatus, HOST_NAME_KEY};
pub use connection::AgentConnection;
pub use connection_settings::{
    ConnectionSettingsCalculator, StaticTelemetrySettings, TelemetrySettingsProvider,
};
pub use errors::ProxyError;
pub use fleet::{FleetQuery, UpdateSignal};
pub use proxy::OpAmpProxy;
