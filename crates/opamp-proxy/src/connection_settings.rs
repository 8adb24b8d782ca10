//! Connection settings offered to agents.
//!
//! The offer carries where an agent should ship its own telemetry plus any
//! named free-form connections. Its `hash` is a SHA-256 digest over a
//! canonical encoding of the offered values, so agents can tell whether an
//! offer changed without comparing the full message.

use std::collections::BTreeMap;
use std::sync::Arc;

use opamp_core::protobufs::{
    ConnectionSettingsOffers, Header, Headers, OtherConnectionSettings,
    TelemetryConnectionSettings,
};
use opamp_settings::{TelemetryDestination, TelemetrySettings};
use sha2::{Digest, Sha256};

/// Source of the telemetry destinations offered to agents.
pub trait TelemetrySettingsProvider: Send + Sync {
    /// Destination for the agent's own metrics.
    fn own_metrics(&self) -> Option<TelemetryDestination>;
    /// Destination for the agent's own traces.
    fn own_traces(&self) -> Option<TelemetryDestination>;
    /// Destination for the agent's own logs.
    fn own_logs(&self) -> Option<TelemetryDestination>;
    /// Named free-form connection settings.
    fn other_connections(&self) -> BTreeMap<String, BTreeMap<String, String>>;
}

/// Provider backed by static configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticTelemetrySettings {
    settings: TelemetrySettings,
}

impl StaticTelemetrySettings {
    /// Wrap loaded settings.
    pub fn new(settings: TelemetrySettings) -> Self {
        Self { settings }
    }
}

impl TelemetrySettingsProvider for StaticTelemetrySettings {
    fn own_metrics(&self) -> Option<TelemetryDestination> {
        self.settings.own_metrics.clone()
    }

    fn own_traces(&self) -> Option<TelemetryDestination> {
        self.settings.own_traces.clone()
    }

    fn own_logs(&self) -> Option<TelemetryDestination> {
        self.settings.own_logs.clone()
    }

    fn other_connections(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.settings.other_connections.clone()
    }
}

/// Builds [`ConnectionSettingsOffers`] from a provider.
#[derive(Clone)]
pub struct ConnectionSettingsCalculator {
    provider: Arc<dyn TelemetrySettingsProvider>,
}

impl std::fmt::Debug for ConnectionSettingsCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettingsCalculator")
            .finish_non_exhaustive()
    }
}

impl ConnectionSettingsCalculator {
    /// Create a calculator over `provider`.
    pub fn new(provider: Arc<dyn TelemetrySettingsProvider>) -> Self {
        Self { provider }
    }

    /// Compute the current offer. `opamp` is never populated.
    pub fn offer(&self) -> ConnectionSettingsOffers {
        let own_metrics = self.provider.own_metrics();
        let own_traces = self.provider.own_traces();
        let own_logs = self.provider.own_logs();
        let other = self.provider.other_connections();

        let hash = settings_hash(
            own_metrics.as_ref(),
            own_traces.as_ref(),
            own_logs.as_ref(),
            &other,
        );

        ConnectionSettingsOffers {
            hash,
            opamp: None,
            own_metrics: own_metrics.map(to_telemetry_settings),
            own_traces: own_traces.map(to_telemetry_settings),
            own_logs: own_logs.map(to_telemetry_settings),
            other_connections: other
                .into_iter()
                .map(|(name, other_settings)| {
                    (
                        name,
                        OtherConnectionSettings {
                            other_settings,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        }
    }
}

fn to_telemetry_settings(dest: TelemetryDestination) -> TelemetryConnectionSettings {
    TelemetryConnectionSettings {
        destination_endpoint: dest.endpoint,
        headers: to_headers(dest.headers),
    }
}

fn to_headers(headers: BTreeMap<String, String>) -> Option<Headers> {
    if headers.is_empty() {
        return None;
    }
    Some(Headers {
        headers: headers
            .into_iter()
            .map(|(key, value)| Header { key, value })
            .collect(),
    })
}

// ── Canonical hashing ───────────────────────────────────────────────────────

const TAG_OWN_METRICS: u8 = 1;
const TAG_OWN_TRACES: u8 = 2;
const TAG_OWN_LOGS: u8 = 3;
const TAG_OTHER: u8 = 4;

/// SHA-256 over a tagged, length-prefixed encoding of the offer contents.
fn settings_hash(
    own_metrics: Option<&TelemetryDestination>,
    own_traces: Option<&TelemetryDestination>,
    own_logs: Option<&TelemetryDestination>,
    other: &BTreeMap<String, BTreeMap<String, String>>,
) -> Vec<u8> {
    let mut hasher = Sha256::new();
    put_destination(&mut hasher, TAG_OWN_METRICS, own_metrics);
    put_destination(&mut hasher, TAG_OWN_TRACES, own_traces);
    put_destination(&mut hasher, TAG_OWN_LOGS, own_logs);
    hasher.update([TAG_OTHER]);
    put_len(&mut hasher, other.len());
    for (name, settings) in other {
        put_str(&mut hasher, name);
        put_map(&mut hasher, settings);
    }
    hasher.finalize().to_vec()
}

fn put_destination(hasher: &mut Sha256, tag: u8, dest: Option<&TelemetryDestination>) {
    hasher.update([tag]);
    match dest {
        None => hasher.update([0]),
        Some(dest) => {
            hasher.update([1]);
            put_str(hasher, &dest.endpoint);
            put_map(hasher, &dest.headers);
        }
    }
}

fn put_map(hasher: &mut Sha256, map: &BTreeMap<String, String>) {
    put_len(hasher, map.len());
    for (key, value) in map {
        put_str(hasher, key);
        put_str(hasher, value);
    }
}

fn put_str(hasher: &mut Sha256, s: &str) {
    put_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn put_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn calculator(settings: TelemetrySettings) -> ConnectionSettingsCalculator {
        ConnectionSettingsCalculator::new(Arc::new(StaticTelemetrySettings::new(settings)))
    }

    fn dest(endpoint: &str) -> TelemetryDestination {
        TelemetryDestination {
            endpoint: endpoint.to_string(),
            headers: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_settings_still_hash() {
        let offer = calculator(TelemetrySettings::default()).offer();
        assert_eq!(offer.hash.len(), 32);
        assert!(offer.opamp.is_none());
        assert!(offer.own_metrics.is_none());
        assert!(offer.other_connections.is_empty());
    }

    #[test]
    fn destinations_are_carried_verbatim() {
        let mut headers = BTreeMap::new();
        let _ = headers.insert("x-tenant".to_string(), "blue".to_string());
        let settings = TelemetrySettings {
            own_metrics: Some(TelemetryDestination {
                endpoint: "http://metrics:4318".into(),
                headers,
            }),
            own_logs: Some(dest("http://logs:4318")),
            ..Default::default()
        };
        let offer = calculator(settings).offer();

        let metrics = offer.own_metrics.unwrap();
        assert_eq!(metrics.destination_endpoint, "http://metrics:4318");
        let headers = metrics.headers.unwrap().headers;
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].key, "x-tenant");
        assert_eq!(headers[0].value, "blue");

        let logs = offer.own_logs.unwrap();
        assert_eq!(logs.destination_endpoint, "http://logs:4318");
        assert!(logs.headers.is_none());
        assert!(offer.own_traces.is_none());
    }

    #[test]
    fn other_connections_become_other_settings() {
        let mut kafka = BTreeMap::new();
        let _ = kafka.insert("brokers".to_string(), "kafka:9092".to_string());
        let mut settings = TelemetrySettings::default();
        let _ = settings.other_connections.insert("kafka".to_string(), kafka.clone());

        let offer = calculator(settings).offer();
        let other = &offer.other_connections["kafka"];
        assert_eq!(other.other_settings, kafka);
        assert!(other.destination_endpoint.is_empty());
    }

    #[test]
    fn same_inputs_same_hash() {
        let settings = TelemetrySettings {
            own_traces: Some(dest("http://traces:4317")),
            ..Default::default()
        };
        assert_eq!(
            calculator(settings.clone()).offer().hash,
            calculator(settings).offer().hash
        );
    }

    #[test]
    fn moving_a_destination_between_slots_changes_hash() {
        let as_metrics = TelemetrySettings {
            own_metrics: Some(dest("http://x")),
            ..Default::default()
        };
        let as_traces = TelemetrySettings {
            own_traces: Some(dest("http://x")),
            ..Default::default()
        };
        assert_ne!(
            calculator(as_metrics).offer().hash,
            calculator(as_traces).offer().hash
        );
    }

    #[test]
    fn empty_destination_differs_from_absent() {
        let absent = TelemetrySettings::default();
        let empty = TelemetrySettings {
            own_logs: Some(dest("")),
            ..Default::default()
        };
        assert_ne!(calculator(absent).offer().hash, calculator(empty).offer().hash);
    }

    #[test]
    fn string_boundaries_are_unambiguous() {
        let mut a = TelemetrySettings::default();
        let mut ab = BTreeMap::new();
        let _ = ab.insert("ab".to_string(), "c".to_string());
        let _ = a.other_connections.insert("n".to_string(), ab);

        let mut b = TelemetrySettings::default();
        let mut a_bc = BTreeMap::new();
        let _ = a_bc.insert("a".to_string(), "bc".to_string());
        let _ = b.other_connections.insert("n".to_string(), a_bc);

        assert_ne!(calculator(a).offer().hash, calculator(b).offer().hash);
    }

    fn destination() -> impl Strategy<Value = Option<TelemetryDestination>> {
        proptest::option::of(
            (
                "[a-z:/.0-9]{0,12}",
                proptest::collection::btree_map("[a-z]{1,4}", "[a-z]{0,4}", 0..3),
            )
                .prop_map(|(endpoint, headers)| TelemetryDestination { endpoint, headers }),
        )
    }

    fn telemetry_settings() -> impl Strategy<Value = TelemetrySettings> {
        (
            destination(),
            destination(),
            destination(),
            proptest::collection::btree_map(
                "[a-z]{1,4}",
                proptest::collection::btree_map("[a-z]{1,4}", "[a-z]{0,4}", 0..3),
                0..3,
            ),
        )
            .prop_map(
                |(own_metrics, own_traces, own_logs, other_connections)| TelemetrySettings {
                    own_metrics,
                    own_traces,
                    own_logs,
                    other_connections,
                },
            )
    }

    proptest! {
        #[test]
        fn hash_is_deterministic(settings in telemetry_settings()) {
            prop_assert_eq!(
                calculator(settings.clone()).offer().hash,
                calculator(settings).offer().hash
            );
        }

        #[test]
        fn distinct_settings_hash_differently(a in telemetry_settings(), b in telemetry_settings()) {
            prop_assume!(a != b);
            prop_assert_ne!(calculator(a).offer().hash, calculator(b).offer().hash);
        }
    }
}
