//! Network and authentication settings.

use serde::{Deserialize, Serialize};

/// Secret used when none is configured. Startup logs a warning when it is in effect.
pub const DEFAULT_JWT_SECRET: &str = "default-secret-key-change-me";

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// Route that accepts WebSocket upgrades.
    pub ws_path: String,
    /// Seconds to wait for tasks during graceful shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_path: "/ws".to_string(),
            shutdown_timeout_secs: 5,
        }
    }
}

/// Bearer token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 signing secret shared with the identity provider.
    pub jwt_secret: String,
    /// Query parameter consulted when the upgrade request has no
    /// `Authorization` header.
    pub token_query_param: String,
}

impl AuthSettings {
    /// Whether the compiled-in secret is still in effect.
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_query_param: "token".to_string(),
        }
    }
}
