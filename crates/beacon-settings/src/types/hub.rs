//! Coordinator and per-session tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hub runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Outbound frames buffered per session before new ones are dropped.
    pub mailbox_capacity: usize,
    /// Commands buffered in front of the coordinator.
    pub command_queue_capacity: usize,
    /// Interval between server-initiated ping frames.
    pub heartbeat_interval_ms: u64,
    /// A session that sends nothing for this long is closed.
    pub read_timeout_ms: u64,
    /// Upper bound on a single frame write.
    pub write_timeout_ms: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
}

impl HubSettings {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Read deadline as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Write deadline as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            command_queue_capacity: 1024,
            heartbeat_interval_ms: 10_000,
            read_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
            max_message_size: 5 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_deadline_covers_several_heartbeats() {
        let hub = HubSettings::default();
        assert_eq!(hub.read_timeout_ms / hub.heartbeat_interval_ms, 6);
    }

    #[test]
    fn duration_helpers() {
        let hub = HubSettings::default();
        assert_eq!(hub.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(hub.read_timeout(), Duration::from_secs(60));
        assert_eq!(hub.write_timeout(), Duration::from_secs(10));
    }
}
