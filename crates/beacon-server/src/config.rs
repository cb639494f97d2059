//! Server configuration.

use std::time::Duration;

use beacon_settings::{BeaconSettings, HubSettings};

/// Per-session limits and timers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Outbound mailbox capacity.
    pub mailbox_capacity: usize,
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Close the session after this long without any inbound frame.
    pub read_timeout: Duration,
    /// Upper bound on a single outbound write.
    pub write_timeout: Duration,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
}

impl SessionConfig {
    /// Build from the `hub` settings section.
    pub fn from_hub_settings(hub: &HubSettings) -> Self {
        Self {
            mailbox_capacity: hub.mailbox_capacity,
            heartbeat_interval: hub.heartbeat_interval(),
            read_timeout: hub.read_timeout(),
            write_timeout: hub.write_timeout(),
            max_message_size: hub.max_message_size,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_hub_settings(&HubSettings::default())
    }
}

/// Configuration for the Beacon server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Route that accepts WebSocket upgrades.
    pub ws_path: String,
    /// Query parameter carrying the token when no header is sent.
    pub token_query_param: String,
    /// Commands buffered in front of the coordinator.
    pub command_queue_capacity: usize,
    /// How long graceful shutdown waits for background tasks.
    pub shutdown_timeout: Duration,
    /// Session limits and timers.
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &BeaconSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            ws_path: settings.server.ws_path.clone(),
            token_query_param: settings.auth.token_query_param.clone(),
            command_queue_capacity: settings.hub.command_queue_capacity,
            shutdown_timeout: Duration::from_secs(settings.server.shutdown_timeout_secs),
            session: SessionConfig::from_hub_settings(&settings.hub),
        }
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = BeaconSettings::default();
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::from_settings(&settings)
        }
    }
}
