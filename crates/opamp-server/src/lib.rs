//! # opamp-server
//!
//! WebSocket transport for the OpAMP bridge:
//!
//! - [`OpAmpServer`]: Axum router with `/v1/opamp` and `/health`
//! - [`websocket::session`]: per-agent frame loop, outbound queue, pings
//! - [`ShutdownCoordinator`]: cancellation plus session draining

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{OPAMP_PATH, OpAmpServer};
pub use shutdown::ShutdownCoordinator;
