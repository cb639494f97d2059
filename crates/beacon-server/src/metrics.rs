//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup; a second install fails.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket sessions opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "beacon_ws_connections_total";
/// WebSocket sessions closed total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "beacon_ws_disconnections_total";
/// Upgrade requests rejected before the hub saw them (counter, labels: code).
pub const WS_REJECTED_TOTAL: &str = "beacon_ws_rejected_total";
/// Session duration seconds (histogram).
pub const WS_SESSION_DURATION_SECONDS: &str = "beacon_ws_session_duration_seconds";
/// Registered sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "beacon_sessions_active";
/// Sessions evicted by a newer registration for the same identity (counter).
pub const SESSIONS_EVICTED_TOTAL: &str = "beacon_sessions_evicted_total";
/// Rooms with at least one member (gauge).
pub const ROOMS_ACTIVE: &str = "beacon_rooms_active";
/// Envelopes routed (counter, labels: route).
pub const MESSAGES_ROUTED_TOTAL: &str = "beacon_messages_routed_total";
/// Envelopes dropped without delivery (counter, labels: reason).
pub const MESSAGES_DROPPED_TOTAL: &str = "beacon_messages_dropped_total";
/// Frames discarded because a session mailbox was full (counter).
pub const MAILBOX_DROPS_TOTAL: &str = "beacon_mailbox_drops_total";
