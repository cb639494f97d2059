//! `BeaconServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{RawQuery, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use beacon_auth::{AuthError, Claims, TokenVerifier, extract_token};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, SessionConfig};
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::hub::{self, HubHandle};
use crate::metrics::{WS_REJECTED_TOTAL, render};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::run_session;

/// How long `/health` waits for the coordinator before reporting degraded.
const HEALTH_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Command queue of the hub coordinator.
    pub hub: HubHandle,
    /// Validates upgrade credentials.
    pub verifier: Arc<TokenVerifier>,
    /// Limits applied to every new session.
    pub session: SessionConfig,
    /// Query parameter consulted when no `Authorization` header is sent.
    pub token_query_param: Arc<str>,
    /// Hands out per-session tokens.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The signaling hub server.
pub struct BeaconServer {
    config: ServerConfig,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
    hub_task: Mutex<Option<JoinHandle<()>>>,
}

impl BeaconServer {
    /// Create a server and start its hub coordinator.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig, verifier: TokenVerifier) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (coordinator, hub) = hub::channel(config.command_queue_capacity, shutdown.token());
        let hub_task = tokio::spawn(coordinator.run());

        let state = AppState {
            hub,
            verifier: Arc::new(verifier),
            session: config.session.clone(),
            token_query_param: Arc::from(config.token_query_param.as_str()),
            shutdown: Arc::clone(&shutdown),
            start_time: Instant::now(),
            metrics: None,
        };

        Self {
            config,
            state,
            shutdown,
            hub_task: Mutex::new(Some(hub_task)),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listener and start serving.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%local_addr, ws_path = %self.config.ws_path, "beacon server listening");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Cancel everything and wait for the serve task and the coordinator.
    pub async fn shutdown_gracefully(&self, server_task: JoinHandle<()>) {
        let mut handles = vec![server_task];
        if let Some(hub_task) = self.hub_task.lock().take() {
            handles.push(hub_task);
        }
        self.shutdown
            .graceful_shutdown(handles, Some(self.config.shutdown_timeout))
            .await;
    }

    /// Get the hub handle.
    pub fn hub(&self) -> &HubHandle {
        &self.state.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws: authenticate, then upgrade.
///
/// Credentials are checked before the upgrade is inspected, so a bad token
/// is always a 401 and never reaches the hub.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let claims = match authenticate(&state, &headers, query.as_deref()) {
        Ok(claims) => claims,
        Err(e) => return reject(&e),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(%rejection, "not a websocket upgrade");
            return rejection.into_response();
        }
    };

    let client_id = claims.client_id();
    debug!(%client_id, email = ?claims.email, "upgrade authorized");

    let hub = state.hub.clone();
    let session = state.session.clone();
    let cancel = state.shutdown.session_token();
    ws.max_message_size(session.max_message_size)
        .on_upgrade(move |socket| run_session(socket, client_id, hub, session, cancel))
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Claims, AuthError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| AuthError::InvalidAuthHeader))
        .transpose()?;
    let token = extract_token(authorization, query, &state.token_query_param)?;
    state.verifier.verify(token)
}

fn reject(err: &AuthError) -> Response {
    let status = match err {
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNAUTHORIZED,
    };
    counter!(WS_REJECTED_TOTAL, "code" => err.code()).increment(1);
    warn!(error = %err, "rejected websocket upgrade");
    let body = serde_json::json!({
        "error": err.to_string(),
        "error_code": err.code(),
    });
    (status, Json(body)).into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = tokio::time::timeout(HEALTH_SNAPSHOT_TIMEOUT, state.hub.snapshot())
        .await
        .ok()
        .and_then(Result::ok);
    Json(health::health_check(state.start_time, snapshot.as_ref()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
