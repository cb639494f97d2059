//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::hub::HubSnapshot;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the coordinator answers, `"degraded"` otherwise.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered sessions.
    pub clients: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
}

/// Build a health response from a coordinator snapshot.
///
/// `None` means the coordinator did not answer.
pub fn health_check(start_time: Instant, snapshot: Option<&HubSnapshot>) -> HealthResponse {
    HealthResponse {
        status: if snapshot.is_some() { "ok" } else { "degraded" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        clients: snapshot.map_or(0, |s| s.clients),
        rooms: snapshot.map_or(0, |s| s.rooms.len()),
    }
}
