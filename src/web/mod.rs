//! Web layer module
//!
//! HTTP interface for the latency service: the SSE latency stream plus a
//! handful of JSON endpoints. Handlers stay thin and delegate to the
//! streaming publisher, the upstream sources and the history log.
//!
//! # Routes
//!
//! - `GET /health`
//! - `GET /api/latency-stream[?locations=US,GB]` (Server-Sent Events)
//! - `GET /api/current-latency?locations=US,GB`
//! - `GET /api/history?range=1h|24h|7d|30d`
//! - `GET /api/regions`

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::{
    config::Config,
    errors::{AppError, AppResult},
    history::HistoryLog,
    reference::ReferenceData,
    sources::{LatencyProvider, ProbeDirectory, ProbeSource, RadarClient},
    streaming::StreamPublisher,
    topology::TopologyEnricher,
};

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use responses::handle_error;

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> AppResult<Self> {
        let addr: SocketAddr = format!("{}:{}", state.config.web.host, state.config.web.port)
            .parse()
            .map_err(|e| {
                AppError::configuration(format!(
                    "Invalid listen address {}:{}: {e}",
                    state.config.web.host, state.config.web.port
                ))
            })?;

        Ok(Self {
            app: Self::create_router(state),
            addr,
        })
    }

    /// Create the router with all routes and middleware
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health::health_check))
            .nest("/api", Self::api_routes())
            // Middleware (applied in reverse order)
            .layer(CorsLayer::permissive())
            .layer(axum::middleware::from_fn(
                middleware::request_logging_middleware,
            ))
            .with_state(state)
    }

    fn api_routes() -> Router<AppState> {
        Router::new()
            .route(
                "/latency-stream",
                get(handlers::latency_stream::latency_stream),
            )
            .route(
                "/current-latency",
                get(handlers::current_latency::current_latency),
            )
            .route("/history", get(handlers::history::get_history))
            .route("/regions", get(handlers::regions::list_regions))
    }

    /// Serve until `cancellation_token` fires, reporting the bound address
    /// (or the bind failure) through `ready_signal`
    pub async fn serve_with_cancellation(
        self,
        ready_signal: tokio::sync::oneshot::Sender<AppResult<SocketAddr>>,
        cancellation_token: CancellationToken,
    ) -> AppResult<()> {
        let listener = match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(bind_error) => {
                let message = format!("Failed to bind to {}: {bind_error}", self.addr);
                let _ = ready_signal.send(Err(AppError::configuration(message.clone())));
                return Err(AppError::configuration(message));
            }
        };

        let local_addr = listener.local_addr()?;
        let _ = ready_signal.send(Ok(local_addr));
        tracing::info!(addr = %local_addr, "Web server listening");

        let shutdown_signal = async move {
            cancellation_token.cancelled().await;
            tracing::info!("Web server received cancellation signal, shutting down gracefully");
        };

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub reference: Arc<ReferenceData>,
    pub probes: Arc<dyn ProbeSource>,
    pub latency: Arc<dyn LatencyProvider>,
    pub publisher: StreamPublisher,
    pub history: Arc<HistoryLog>,
    /// Application start time for uptime calculation
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Wire state from explicit sources; the publisher writes history only
    /// when `history.enabled` is set
    pub fn new(
        config: Config,
        reference: Arc<ReferenceData>,
        probes: Arc<dyn ProbeSource>,
        latency: Arc<dyn LatencyProvider>,
    ) -> Self {
        let history = Arc::new(HistoryLog::new(config.storage.history_dir.clone()));

        let mut publisher = StreamPublisher::new(
            probes.clone(),
            latency.clone(),
            reference.clone(),
            TopologyEnricher::new(config.stream.nearest_k),
            config.stream.location_timeout,
        );
        if config.history.enabled {
            publisher = publisher.with_history(history.clone());
        }

        Self {
            config: Arc::new(config),
            reference,
            probes,
            latency,
            publisher,
            history,
            start_time: chrono::Utc::now(),
        }
    }

    /// Wire state against the real upstream APIs and embedded reference data
    pub fn from_config(config: Config) -> AppResult<Self> {
        let reference = Arc::new(ReferenceData::embedded()?);
        let probes = ProbeDirectory::new(&config.upstream, config.storage.probe_cache_path.clone())?;
        let radar = RadarClient::new(&config.upstream)?;

        if !radar.has_credentials() {
            tracing::warn!("No radar API token configured, serving synthetic latency");
        }
        if config.upstream.probe_token().is_none() {
            tracing::warn!("No probe API token configured, probe list limited to cache and fallback");
        }
        tracing::info!(
            servers = reference.servers().len(),
            countries = reference.country_count(),
            "Loaded reference data"
        );

        Ok(Self::new(config, reference, Arc::new(probes), Arc::new(radar)))
    }
}
