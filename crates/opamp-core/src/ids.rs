//! Identifier newtypes.
//!
//! [`InstanceId`] is the canonical 128-bit identity of an agent instance.
//! Agents put it on the wire either as 16 raw bytes or, for older clients,
//! as a 26-character ULID string; both decode to the same UUID space.
//!
//! [`ConnectionId`] names one transport connection and is generated locally
//! as a prefixed UUID v7.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of a canonical instance uid on the wire.
pub const CANONICAL_UID_LEN: usize = 16;

/// Length of a legacy ULID-encoded instance uid on the wire.
pub const LEGACY_UID_LEN: usize = 26;

/// Reasons an on-wire instance uid cannot be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstanceIdError {
    /// Neither 16 nor 26 bytes.
    #[error("invalid instance uid length {len}, expected {CANONICAL_UID_LEN} or {LEGACY_UID_LEN}")]
    InvalidLength {
        /// Observed length.
        len: usize,
    },

    /// 26 bytes that do not form a valid ULID.
    #[error("malformed legacy instance uid: {0}")]
    MalformedLegacy(String),
}

/// An instance uid as it arrived on the wire, tagged by encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInstanceUid {
    /// 16 raw bytes.
    Canonical([u8; CANONICAL_UID_LEN]),
    /// 26 bytes of Crockford base32 text.
    Legacy([u8; LEGACY_UID_LEN]),
}

impl RawInstanceUid {
    /// Classify `bytes` by length.
    pub fn parse(bytes: &[u8]) -> Result<Self, InstanceIdError> {
        if let Ok(raw) = <[u8; CANONICAL_UID_LEN]>::try_from(bytes) {
            return Ok(Self::Canonical(raw));
        }
        if let Ok(raw) = <[u8; LEGACY_UID_LEN]>::try_from(bytes) {
            return Ok(Self::Legacy(raw));
        }
        Err(InstanceIdError::InvalidLength { len: bytes.len() })
    }

    /// Canonicalize into an [`InstanceId`].
    pub fn canonicalize(self) -> Result<InstanceId, InstanceIdError> {
        match self {
            Self::Canonical(raw) => Ok(InstanceId(Uuid::from_bytes(raw))),
            Self::Legacy(raw) => {
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| InstanceIdError::MalformedLegacy(e.to_string()))?;
                let ulid = ulid::Ulid::from_string(text)
                    .map_err(|e| InstanceIdError::MalformedLegacy(e.to_string()))?;
                Ok(InstanceId(Uuid::from_u128(ulid.0)))
            }
        }
    }
}

/// Canonical identity of an agent instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Parse the `instance_uid` field of an inbound message.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, InstanceIdError> {
        RawInstanceUid::parse(bytes)?.canonicalize()
    }

    /// Random (v7) instance id. Handy for tests and simulated agents.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Canonical 16-byte wire form.
    pub fn to_bytes(self) -> [u8; CANONICAL_UID_LEN] {
        self.0.into_bytes()
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for InstanceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<InstanceId> for Uuid {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Unique identifier for one transport connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new ID (`conn_` + UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
