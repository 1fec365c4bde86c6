use crate::api;
use crate::config::ServerConfig;
use crate::queue::{QueueManager, QueueSettings};
use crate::signaling::{LogSessionSink, RelaySettings, SessionSink, SignalingRelay, ws_handler};
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::FromRef;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: SignalingRelay,
    pub queue: QueueManager,
    pub config: Arc<ServerConfig>,
}

impl FromRef<AppState> for SignalingRelay {
    fn from_ref(state: &AppState) -> Self {
        state.relay.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    // Browser clients are served from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{participant_id}", get(ws_handler))
        .route("/queue/enqueue", post(api::enqueue))
        .route("/queue/status", post(api::status))
        .route("/queue/cancel", post(api::cancel))
        .route("/health", get(api::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Owns the queue actor, the relay and their background tasks.
pub struct UpliftServer {
    state: AppState,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl UpliftServer {
    /// Must be called inside a tokio runtime: the background tasks start here.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_sink(config, Arc::new(LogSessionSink))
    }

    pub fn with_sink(config: ServerConfig, sink: Arc<dyn SessionSink>) -> Self {
        let token = CancellationToken::new();
        let relay = SignalingRelay::new(RelaySettings::from(&config), sink);

        let (queue, queue_task) = QueueManager::spawn(
            QueueSettings {
                ttl: config.queue_ttl(),
                sweep_interval: config.sweep_interval(),
                request_timeout: config.request_timeout(),
            },
            Arc::new(relay.clone()),
            token.child_token(),
        );
        let maintenance = tokio::spawn(relay.clone().run_maintenance(token.child_token()));

        Self {
            state: AppState {
                relay,
                queue,
                config: Arc::new(config),
            },
            token,
            tasks: vec![queue_task, maintenance],
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Cancelling it has the same effect as [`UpliftServer::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Binds the configured address and serves until shut down.
    pub async fn run(self) -> Result<()> {
        let bind = self.state.config.bind;
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Uplift server listening on http://{}", addr);

        let shutdown = self.token.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("server error")?;

        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Uplift server stopped");
        Ok(())
    }
}
