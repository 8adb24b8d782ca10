//! `OpAmpServer`: Axum HTTP + WebSocket listener in front of the proxy.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use opamp_proxy::OpAmpProxy;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{SessionConfig, run_agent_session};

/// Path agents connect to.
pub const OPAMP_PATH: &str = "/v1/opamp";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Agent registry.
    pub proxy: Arc<OpAmpProxy>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Transport configuration.
    pub config: Arc<ServerConfig>,
}

/// The OpAMP bridge server.
pub struct OpAmpServer {
    config: Arc<ServerConfig>,
    proxy: Arc<OpAmpProxy>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl OpAmpServer {
    /// Create a new server over `proxy`.
    pub fn new(config: ServerConfig, proxy: Arc<OpAmpProxy>) -> Self {
        Self {
            config: Arc::new(config),
            proxy,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            proxy: Arc::clone(&self.proxy),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            config: Arc::clone(&self.config),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route(OPAMP_PATH, get(opamp_handler))
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = TcpListener::bind(&self.config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.listen.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "OpAMP server stopped with error");
            }
        });

        info!(%addr, path = OPAMP_PATH, "OpAMP server listening");
        Ok((addr, handle))
    }

    /// Get the proxy.
    pub fn proxy(&self) -> &Arc<OpAmpProxy> {
        &self.proxy
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open agent sessions.
    pub fn session_count(&self) -> usize {
        self.shutdown.active_sessions()
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        &state.config.name,
        state.shutdown.active_sessions(),
        state.proxy.agent_count(),
    ))
}

/// GET /v1/opamp
async fn opamp_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let session_config = SessionConfig {
        heartbeat_interval: state.config.heartbeat_interval(),
        heartbeat_timeout: state.config.heartbeat_timeout(),
        max_send_queue: state.config.max_send_queue,
    };
    let proxy = Arc::clone(&state.proxy);
    let shutdown = Arc::clone(&state.shutdown);

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            let cancel = shutdown.token();
            shutdown.track(run_agent_session(socket, proxy, session_config, cancel))
        })
}
