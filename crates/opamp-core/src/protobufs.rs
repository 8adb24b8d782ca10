//! OpAMP protocol messages.
//!
//! Field numbers follow upstream `opamp.proto` and `anyvalue.proto`, so
//! frames produced by real collectors decode here unchanged. Only the messages the bridge reads or writes are declared;
//! unknown fields are skipped by prost on decode.

use std::collections::BTreeMap;

/// Status report sent by an agent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentToServer {
    #[prost(bytes = "vec", tag = "1")]
    pub instance_uid: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub sequence_num: u64,
    #[prost(message, optional, tag = "3")]
    pub agent_description: Option<AgentDescription>,
    /// Bitmask of [`AgentCapabilities`].
    #[prost(uint64, tag = "4")]
    pub capabilities: u64,
    #[prost(message, optional, tag = "5")]
    pub health: Option<ComponentHealth>,
    #[prost(message, optional, tag = "6")]
    pub effective_config: Option<EffectiveConfig>,
    #[prost(message, optional, tag = "7")]
    pub remote_config_status: Option<RemoteConfigStatus>,
    #[prost(message, optional, tag = "8")]
    pub package_statuses: Option<PackageStatuses>,
    #[prost(message, optional, tag = "9")]
    pub agent_disconnect: Option<AgentDisconnect>,
    #[prost(message, optional, tag = "13")]
    pub custom_message: Option<CustomMessage>,
}

/// Response or push sent by the server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerToAgent {
    #[prost(bytes = "vec", tag = "1")]
    pub instance_uid: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub error_response: Option<ServerErrorResponse>,
    #[prost(message, optional, tag = "4")]
    pub connection_settings: Option<ConnectionSettingsOffers>,
    /// Bitmask of [`ServerToAgentFlags`].
    #[prost(uint64, tag = "6")]
    pub flags: u64,
    /// Bitmask of [`ServerCapabilities`].
    #[prost(uint64, tag = "7")]
    pub capabilities: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerErrorResponse {
    #[prost(enumeration = "ServerErrorResponseType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
    #[prost(oneof = "server_error_response::Details", tags = "3")]
    pub details: Option<server_error_response::Details>,
}

/// Nested types of [`ServerErrorResponse`].
pub mod server_error_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Details {
        #[prost(message, tag = "3")]
        RetryInfo(super::RetryInfo),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct RetryInfo {
    #[prost(uint64, tag = "1")]
    pub retry_after_nanoseconds: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConnectionSettingsOffers {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub opamp: Option<OpAmpConnectionSettings>,
    #[prost(message, optional, tag = "3")]
    pub own_metrics: Option<TelemetryConnectionSettings>,
    #[prost(message, optional, tag = "4")]
    pub own_traces: Option<TelemetryConnectionSettings>,
    #[prost(message, optional, tag = "5")]
    pub own_logs: Option<TelemetryConnectionSettings>,
    #[prost(btree_map = "string, message", tag = "6")]
    pub other_connections: BTreeMap<String, OtherConnectionSettings>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpAmpConnectionSettings {
    #[prost(string, tag = "1")]
    pub destination_endpoint: String,
    #[prost(message, optional, tag = "2")]
    pub headers: Option<Headers>,
    #[prost(uint64, tag = "4")]
    pub heartbeat_interval_seconds: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TelemetryConnectionSettings {
    #[prost(string, tag = "1")]
    pub destination_endpoint: String,
    #[prost(message, optional, tag = "2")]
    pub headers: Option<Headers>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OtherConnectionSettings {
    #[prost(string, tag = "1")]
    pub destination_endpoint: String,
    #[prost(message, optional, tag = "2")]
    pub headers: Option<Headers>,
    #[prost(btree_map = "string, string", tag = "4")]
    pub other_settings: BTreeMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Headers {
    #[prost(message, repeated, tag = "1")]
    pub headers: Vec<Header>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentDescription {
    #[prost(message, repeated, tag = "1")]
    pub identifying_attributes: Vec<KeyValue>,
    #[prost(message, repeated, tag = "2")]
    pub non_identifying_attributes: Vec<KeyValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ComponentHealth {
    #[prost(bool, tag = "1")]
    pub healthy: bool,
    #[prost(fixed64, tag = "2")]
    pub start_time_unix_nano: u64,
    #[prost(string, tag = "3")]
    pub last_error: String,
    #[prost(string, tag = "4")]
    pub status: String,
    #[prost(fixed64, tag = "5")]
    pub status_time_unix_nano: u64,
    #[prost(btree_map = "string, message", tag = "6")]
    pub component_health_map: BTreeMap<String, ComponentHealth>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EffectiveConfig {
    #[prost(message, optional, tag = "1")]
    pub config_map: Option<AgentConfigMap>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentConfigMap {
    #[prost(btree_map = "string, message", tag = "1")]
    pub config_map: BTreeMap<String, AgentConfigFile>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentConfigFile {
    #[prost(bytes = "vec", tag = "1")]
    pub body: Vec<u8>,
    #[prost(string, tag = "2")]
    pub content_type: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteConfigStatus {
    #[prost(bytes = "vec", tag = "1")]
    pub last_remote_config_hash: Vec<u8>,
    #[prost(enumeration = "RemoteConfigStatuses", tag = "2")]
    pub status: i32,
    #[prost(string, tag = "3")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PackageStatuses {
    #[prost(btree_map = "string, message", tag = "1")]
    pub packages: BTreeMap<String, PackageStatus>,
    #[prost(bytes = "vec", tag = "2")]
    pub server_provided_all_packages_hash: Vec<u8>,
    #[prost(string, tag = "3")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PackageStatus {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub agent_has_version: String,
    #[prost(bytes = "vec", tag = "3")]
    pub agent_has_hash: Vec<u8>,
    #[prost(string, tag = "4")]
    pub server_offered_version: String,
    #[prost(bytes = "vec", tag = "5")]
    pub server_offered_hash: Vec<u8>,
    #[prost(int32, tag = "6")]
    pub status: i32,
    #[prost(string, tag = "7")]
    pub error_message: String,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct AgentDisconnect {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CustomMessage {
    #[prost(string, tag = "1")]
    pub capability: String,
    #[prost(string, tag = "2")]
    pub r#type: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<AnyValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AnyValue {
    #[prost(oneof = "any_value::Value", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub value: Option<any_value::Value>,
}

/// Nested types of [`AnyValue`].
pub mod any_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "1")]
        StringValue(String),
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        #[prost(int64, tag = "3")]
        IntValue(i64),
        #[prost(double, tag = "4")]
        DoubleValue(f64),
        #[prost(message, tag = "5")]
        ArrayValue(super::ArrayValue),
        #[prost(message, tag = "6")]
        KvlistValue(super::KeyValueList),
        #[prost(bytes = "vec", tag = "7")]
        BytesValue(Vec<u8>),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ArrayValue {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<AnyValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValueList {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<KeyValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AgentCapabilities {
    Unspecified = 0,
    ReportsStatus = 0x1,
    AcceptsRemoteConfig = 0x2,
    ReportsEffectiveConfig = 0x4,
    AcceptsPackages = 0x8,
    ReportsPackageStatuses = 0x10,
    ReportsOwnTraces = 0x20,
    ReportsOwnMetrics = 0x40,
    ReportsOwnLogs = 0x80,
    AcceptsOpAmpConnectionSettings = 0x100,
    AcceptsOtherConnectionSettings = 0x200,
    AcceptsRestartCommand = 0x400,
    ReportsHealth = 0x800,
    ReportsRemoteConfig = 0x1000,
    ReportsHeartbeat = 0x2000,
    ReportsAvailableComponents = 0x4000,
}

impl AgentCapabilities {
    /// Bit value of this capability.
    #[allow(clippy::cast_sign_loss)]
    pub fn bit(self) -> u64 {
        self as i32 as u64
    }

    /// Whether `mask` has this capability set.
    pub fn is_set_in(self, mask: u64) -> bool {
        mask & self.bit() != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ServerCapabilities {
    Unspecified = 0,
    AcceptsStatus = 0x1,
    OffersRemoteConfig = 0x2,
    AcceptsEffectiveConfig = 0x4,
    OffersPackages = 0x8,
    AcceptsPackagesStatus = 0x10,
    OffersConnectionSettings = 0x20,
    AcceptsConnectionSettingsRequest = 0x40,
}

impl ServerCapabilities {
    /// String value of the enum field names used in the ProtoBuf definition.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "ServerCapabilities_Unspecified",
            Self::AcceptsStatus => "ServerCapabilities_AcceptsStatus",
            Self::OffersRemoteConfig => "ServerCapabilities_OffersRemoteConfig",
            Self::AcceptsEffectiveConfig => "ServerCapabilities_AcceptsEffectiveConfig",
            Self::OffersPackages => "ServerCapabilities_OffersPackages",
            Self::AcceptsPackagesStatus => "ServerCapabilities_AcceptsPackagesStatus",
            Self::OffersConnectionSettings => "ServerCapabilities_OffersConnectionSettings",
            Self::AcceptsConnectionSettingsRequest => {
                "ServerCapabilities_AcceptsConnectionSettingsRequest"
            }
        }
    }

    /// Creates an enum from field names used in the ProtoBuf definition.
    pub fn from_str_name(value: &str) -> Option<Self> {
        match value {
            "ServerCapabilities_Unspecified" => Some(Self::Unspecified),
            "ServerCapabilities_AcceptsStatus" => Some(Self::AcceptsStatus),
            "ServerCapabilities_OffersRemoteConfig" => Some(Self::OffersRemoteConfig),
            "ServerCapabilities_AcceptsEffectiveConfig" => Some(Self::AcceptsEffectiveConfig),
            "ServerCapabilities_OffersPackages" => Some(Self::OffersPackages),
            "ServerCapabilities_AcceptsPackagesStatus" => Some(Self::AcceptsPackagesStatus),
            "ServerCapabilities_OffersConnectionSettings" => {
                Some(Self::OffersConnectionSettings)
            }
            "ServerCapabilities_AcceptsConnectionSettingsRequest" => {
                Some(Self::AcceptsConnectionSettingsRequest)
            }
            _ => None,
        }
    }

    /// Bit value of this capability.
    #[allow(clippy::cast_sign_loss)]
    pub fn bit(self) -> u64 {
        self as i32 as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ServerToAgentFlags {
    Unspecified = 0,
    ReportFullState = 0x1,
    ReportAvailableComponents = 0x2,
}

impl ServerToAgentFlags {
    /// Bit value of this flag.
    #[allow(clippy::cast_sign_loss)]
    pub fn bit(self) -> u64 {
        self as i32 as u64
    }

    /// Whether `mask` has this flag set.
    pub fn is_set_in(self, mask: u64) -> bool {
        mask & self.bit() != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ServerErrorResponseType {
    Unknown = 0,
    BadRequest = 1,
    Unavailable = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RemoteConfigStatuses {
    Unset = 0,
    Applied = 1,
    Applying = 2,
    Failed = 3,
}

impl KeyValue {
    /// Build a key/value pair holding a string.
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(value.into())),
            }),
        }
    }

    /// The string payload, if this pair holds one.
    pub fn as_str(&self) -> Option<&str> {
        match self.value.as_ref()?.value.as_ref()? {
            any_value::Value::StringValue(s) => Some(s),
            _ => None,
        }
    }
}

impl AgentDescription {
    /// Whether neither attribute list carries anything.
    pub fn is_empty(&self) -> bool {
        self.identifying_attributes.is_empty() && self.non_identifying_attributes.is_empty()
    }

    /// Last string value reported for `key` among the non-identifying attributes.
    pub fn non_identifying_str(&self, key: &str) -> Option<&str> {
        self.non_identifying_attributes
            .iter()
            .filter(|kv| kv.key == key)
            .filter_map(KeyValue::as_str)
            .last()
    }
}

impl ServerErrorResponse {
    /// A `BadRequest` error carrying `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            r#type: ServerErrorResponseType::BadRequest as i32,
            error_message: message.into(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn capability_bits_match_wire_values() {
        assert_eq!(AgentCapabilities::ReportsHealth.bit(), 0x800);
        assert_eq!(AgentCapabilities::ReportsEffectiveConfig.bit(), 0x4);
        assert_eq!(ServerCapabilities::OffersConnectionSettings.bit(), 0x20);
        assert_eq!(ServerToAgentFlags::ReportFullState.bit(), 1);
    }

    #[test]
    fn is_set_in_checks_mask() {
        let mask = AgentCapabilities::ReportsStatus.bit() | AgentCapabilities::ReportsHealth.bit();
        assert!(AgentCapabilities::ReportsHealth.is_set_in(mask));
        assert!(!AgentCapabilities::ReportsRemoteConfig.is_set_in(mask));
    }

    #[test]
    fn server_capability_names() {
        for cap in [
            ServerCapabilities::AcceptsStatus,
            ServerCapabilities::OffersConnectionSettings,
            ServerCapabilities::AcceptsConnectionSettingsRequest,
        ] {
            assert_eq!(ServerCapabilities::from_str_name(cap.as_str_name()), Some(cap));
        }
        assert_eq!(ServerCapabilities::from_str_name("AcceptsStatus"), None);
    }

    #[test]
    fn key_value_string_accessor() {
        let kv = KeyValue::string("host.name", "collector-0");
        assert_eq!(kv.as_str(), Some("collector-0"));

        let not_string = KeyValue {
            key: "pid".into(),
            value: Some(AnyValue {
                value: Some(any_value::Value::IntValue(42)),
            }),
        };
        assert_eq!(not_string.as_str(), None);
    }

    #[test]
    fn description_lookup_uses_non_identifying_attributes() {
        let desc = AgentDescription {
            identifying_attributes: vec![KeyValue::string("host.name", "ignored")],
            non_identifying_attributes: vec![
                KeyValue::string("os.type", "linux"),
                KeyValue::string("host.name", "pod-a"),
            ],
        };
        assert_eq!(desc.non_identifying_str("host.name"), Some("pod-a"));
        assert_eq!(desc.non_identifying_str("missing"), None);
        assert!(!desc.is_empty());
        assert!(AgentDescription::default().is_empty());
    }

    #[test]
    fn agent_to_server_survives_the_wire() {
        let msg = AgentToServer {
            instance_uid: vec![7; 16],
            sequence_num: 3,
            capabilities: AgentCapabilities::ReportsHealth.bit(),
            health: Some(ComponentHealth {
                healthy: true,
                status: "StatusOK".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let decoded = AgentToServer::decode(msg.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn bad_request_sets_type() {
        let err = ServerErrorResponse::bad_request("nope");
        assert_eq!(err.r#type, ServerErrorResponseType::BadRequest as i32);
        assert_eq!(err.error_message, "nope");
    }
}
