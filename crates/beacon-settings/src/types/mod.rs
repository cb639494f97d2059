//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it overrides.

mod hub;
mod server;

pub use hub::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the Beacon hub.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "hub": { "mailboxCapacity": 512 },
///   "auth": { "jwtSecret": "change-me" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconSettings {
    /// Network binding and routes.
    pub server: ServerSettings,
    /// Coordinator and session tuning.
    pub hub: HubSettings,
    /// Bearer token verification.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
