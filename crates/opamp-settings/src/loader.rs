//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BridgeSettings::default()`]
//! 2. If a settings file is given and exists, deep-merge its values over defaults
//! 3. Apply `OPAMP_BRIDGE_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::net::SocketAddr;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{BridgeSettings, LogFormat, LogLevel};

/// Load defaults with env var overrides, no file.
pub fn load_settings() -> Result<BridgeSettings> {
    finish(BridgeSettings::default())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    let defaults = serde_json::to_value(BridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    finish(serde_json::from_value(merged)?)
}

fn finish(mut settings: BridgeSettings) -> Result<BridgeSettings> {
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Check values that serde cannot.
pub fn validate(settings: &BridgeSettings) -> Result<()> {
    let _: SocketAddr = settings.listen.parse().map_err(|e| {
        SettingsError::InvalidValue(format!("listen {:?}: {e}", settings.listen))
    })?;
    if settings.max_message_size == 0 {
        return Err(SettingsError::InvalidValue(
            "maxMessageSize must be positive".to_string(),
        ));
    }
    if let Some(interval) = settings.heartbeat_interval() {
        if settings.heartbeat_timeout() <= interval {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeatTimeoutSecs ({}) must exceed heartbeatIntervalSecs ({})",
                settings.heartbeat_timeout_secs,
                interval.as_secs()
            )));
        }
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut BridgeSettings) {
    if let Some(v) = read_env_string("OPAMP_BRIDGE_LISTEN") {
        settings.listen = v;
    }
    if let Some(v) = read_env_string("OPAMP_BRIDGE_NAME") {
        settings.name = v;
    }
    if let Some(v) = read_env_u64("OPAMP_BRIDGE_HEARTBEAT_INTERVAL", 0, 3600) {
        settings.heartbeat_interval_secs = Some(v);
    }
    if let Some(v) = read_env_parsed("OPAMP_BRIDGE_LOG_LEVEL", LogLevel::parse) {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_parsed("OPAMP_BRIDGE_LOG_FORMAT", LogFormat::parse) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_parsed<T>(name: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    let val = std::env::var(name).ok()?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}
