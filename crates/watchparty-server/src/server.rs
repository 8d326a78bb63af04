//! `WatchpartyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use watchparty_core::ConnectionId;

use crate::api;
use crate::catalog::{Catalog, DirectoryCatalog};
use crate::config::ServerConfig;
use crate::errors::{Result, ServerError};
use crate::health::{self, HealthResponse};
use crate::hub::{Hub, HubHandle};
use crate::metrics::WS_CONNECTIONS_REFUSED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::admission::Admission;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sender side of the party hub.
    pub hub: HubHandle,
    /// Library catalog.
    pub catalog: Arc<dyn Catalog>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// WebSocket connection slots.
    pub admission: Admission,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// Query string accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Display name; blank or missing becomes `"Anonymous"`.
    pub username: Option<String>,
}

/// The watch-party server.
pub struct WatchpartyServer {
    state: AppState,
}

impl WatchpartyServer {
    /// Create a server with a directory-backed catalog and start its hub.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        let catalog = Arc::new(DirectoryCatalog::new(config.library_dir.clone()));
        Self::with_catalog(config, catalog, metrics)
    }

    /// Create a server with a custom catalog and start its hub.
    ///
    /// Must be called within a Tokio runtime.
    pub fn with_catalog(
        config: ServerConfig,
        catalog: Arc<dyn Catalog>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, handle) = Hub::new();
        shutdown.track("hub", tokio::spawn(hub.run(shutdown.token())));

        let state = AppState {
            hub: handle,
            catalog,
            admission: Admission::new(config.max_connections),
            config: Arc::new(config),
            shutdown,
            start_time: Instant::now(),
            metrics,
        };
        Self { state }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/api/library", get(api::list_library))
            .route("/api/jobs/{id}/status", post(api::post_job_status))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// The serve task is tracked by the shutdown coordinator; [`stop`](Self::stop)
    /// waits for it. Returns the bound address.
    pub async fn listen(&self) -> Result<SocketAddr> {
        let addr = self.state.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::bind(addr.clone(), e))?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!(%local_addr, "watchparty server listening");

        let router = self.router();
        let token = self.state.shutdown.token();
        let serve = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                warn!(error = %e, "server stopped with error");
            }
        });
        self.state.shutdown.track("http", serve);

        Ok(local_addr)
    }

    /// Shut down and wait up to `timeout` for the listener and hub to stop.
    ///
    /// Returns the names of tasks that had to be aborted.
    pub async fn stop(&self, timeout: Duration) -> Vec<&'static str> {
        self.state.shutdown.drain(timeout).await
    }

    /// Sender side of the party hub.
    pub fn hub(&self) -> &HubHandle {
        &self.state.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => {
            let resp: HealthResponse =
                health::health_check(state.start_time, stats.connections, stats.parties);
            Json(resp).into_response()
        }
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(health::degraded(state.start_time)),
        )
            .into_response(),
    }
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(slot) = state.admission.try_acquire() else {
        warn!(
            max = state.admission.limit(),
            "connection limit reached, refusing upgrade"
        );
        counter!(WS_CONNECTIONS_REFUSED_TOTAL).increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let conn_id = ConnectionId::new();
    let closed = state.shutdown.session_token();
    // a failed upgrade drops the callback, and the slot with it
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(
                socket,
                conn_id,
                query.username,
                state.hub,
                state.config,
                closed,
                slot,
            )
        })
}
