//! # opamp-core
//!
//! Wire-level building blocks shared by every crate of the bridge:
//!
//! - [`protobufs`]: the subset of OpAMP protobuf messages the bridge speaks
//! - [`codec`]: WebSocket binary frame encoding (varint header + payload)
//! - [`ids`]: agent instance identifiers and connection identifiers

#![deny(unsafe_code)]

pub mod codec;
pub mod ids;
#[allow(
    missing_docs,
    clippy::derive_partial_eq_without_eq,
    clippy::doc_markdown,
    clippy::must_use_candidate
)]
pub mod protobufs;

pub use codec::{FrameError, decode_frame, encode_frame};
pub use ids::{ConnectionId, InstanceId, InstanceIdError, RawInstanceUid};
