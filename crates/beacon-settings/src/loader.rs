//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BeaconSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::BeaconSettings;

/// Resolve the default settings file path (`~/.beacon/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".beacon").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BeaconSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a configuration that fails
/// [`validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BeaconSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Read and merge a settings file over defaults, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<BeaconSettings> {
    let defaults = serde_json::to_value(BeaconSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
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

/// Apply `BEACON_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut BeaconSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_overrides<F>(settings: &mut BeaconSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("BEACON_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = string("BEACON_PORT").and_then(|v| checked("BEACON_PORT", &v, parse_u16_range(&v, 0, 65535))) {
        settings.server.port = v;
    }
    if let Some(v) = string("BEACON_WS_PATH") {
        settings.server.ws_path = v;
    }
    if let Some(v) = string("BEACON_SHUTDOWN_TIMEOUT_SECS").and_then(|v| {
        checked("BEACON_SHUTDOWN_TIMEOUT_SECS", &v, parse_u64_range(&v, 1, 300))
    }) {
        settings.server.shutdown_timeout_secs = v;
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = string("BEACON_HEARTBEAT_INTERVAL_MS").and_then(|v| {
        checked("BEACON_HEARTBEAT_INTERVAL_MS", &v, parse_u64_range(&v, 100, 600_000))
    }) {
        settings.hub.heartbeat_interval_ms = v;
    }
    if let Some(v) = string("BEACON_READ_TIMEOUT_MS").and_then(|v| {
        checked("BEACON_READ_TIMEOUT_MS", &v, parse_u64_range(&v, 100, 3_600_000))
    }) {
        settings.hub.read_timeout_ms = v;
    }
    if let Some(v) = string("BEACON_WRITE_TIMEOUT_MS").and_then(|v| {
        checked("BEACON_WRITE_TIMEOUT_MS", &v, parse_u64_range(&v, 100, 600_000))
    }) {
        settings.hub.write_timeout_ms = v;
    }
    if let Some(v) = string("BEACON_MAILBOX_CAPACITY").and_then(|v| {
        checked("BEACON_MAILBOX_CAPACITY", &v, parse_usize_range(&v, 1, 65_536))
    }) {
        settings.hub.mailbox_capacity = v;
    }
    if let Some(v) = string("BEACON_COMMAND_QUEUE_CAPACITY").and_then(|v| {
        checked("BEACON_COMMAND_QUEUE_CAPACITY", &v, parse_usize_range(&v, 1, 1_048_576))
    }) {
        settings.hub.command_queue_capacity = v;
    }
    if let Some(v) = string("BEACON_MAX_MESSAGE_SIZE").and_then(|v| {
        checked("BEACON_MAX_MESSAGE_SIZE", &v, parse_usize_range(&v, 64, 1_048_576))
    }) {
        settings.hub.max_message_size = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = string("BEACON_JWT_SECRET").or_else(|| string("SECRET_KEY")) {
        settings.auth.jwt_secret = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("BEACON_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("BEACON_LOG_JSON").and_then(|v| checked("BEACON_LOG_JSON", &v, parse_bool(&v))) {
        settings.logging.json = v;
    }
}

/// Reject configurations the hub cannot run with.
pub fn validate(settings: &BeaconSettings) -> Result<()> {
    let hub = &settings.hub;
    if hub.heartbeat_interval_ms == 0 || hub.heartbeat_interval_ms >= hub.read_timeout_ms {
        return Err(SettingsError::InvalidValue(format!(
            "heartbeatIntervalMs ({}) must be positive and shorter than readTimeoutMs ({})",
            hub.heartbeat_interval_ms, hub.read_timeout_ms
        )));
    }
    if hub.mailbox_capacity == 0 {
        return Err(SettingsError::InvalidValue("mailboxCapacity must be positive".into()));
    }
    if hub.command_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "commandQueueCapacity must be positive".into(),
        ));
    }
    if hub.max_message_size == 0 {
        return Err(SettingsError::InvalidValue("maxMessageSize must be positive".into()));
    }
    if hub.write_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue("writeTimeoutMs must be positive".into()));
    }
    if settings.auth.jwt_secret.is_empty() {
        return Err(SettingsError::InvalidValue("jwtSecret must not be empty".into()));
    }
    if !settings.server.ws_path.starts_with('/') {
        return Err(SettingsError::InvalidValue(format!(
            "wsPath must start with '/': {}",
            settings.server.ws_path
        )));
    }
    Ok(())
}

fn checked<T>(name: &str, raw: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        warn!(key = name, value = %raw, "invalid env var, ignoring");
    }
    parsed
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
