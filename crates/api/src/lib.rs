//! Focus Tracker API Server
//!
//! Session control, focus polling and the live MJPEG stream.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use session::{SessionError, SessionWorker};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod routes;
pub mod settings;

pub use settings::{LoggingSettings, ServerSettings, Settings};

/// Application state shared across handlers
pub struct AppState {
    /// The single session worker
    pub worker: SessionWorker,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Prometheus handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(worker: SessionWorker) -> Self {
        Self {
            worker,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Handler errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("No active video stream")]
    NoStream,
}

/// Body of session control responses
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<uuid::Uuid>,
}

impl ControlResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            session_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            session_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Session(e) => {
                let (status, message) = match &e {
                    SessionError::AlreadyRunning => {
                        (StatusCode::CONFLICT, "Session already running.".to_string())
                    }
                    SessionError::NotRunning => {
                        (StatusCode::CONFLICT, "No active session found.".to_string())
                    }
                    SessionError::DeviceUnavailable(cause) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        format!("Could not open capture device: {}", cause),
                    ),
                };
                (status, Json(ControlResponse::error(message))).into_response()
            }
            ApiError::NoStream => (StatusCode::NOT_FOUND, "No active video stream").into_response(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub session: SessionHealth,
}

#[derive(Debug, Serialize)]
pub struct SessionHealth {
    pub active: bool,
    pub has_published: bool,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/start_session", post(routes::session::start_session))
        .route("/stop_session", post(routes::session::stop_session))
        .route("/focus_data", get(routes::focus::get_focus_data))
        .route("/video_feed", get(routes::video::video_feed))
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        session: SessionHealth {
            active: state.worker.is_running(),
            has_published: state.worker.has_published(),
        },
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics recorder not installed").into_response(),
    }
}

/// Initialize logging
pub fn init_logging(
    settings: &LoggingSettings,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = settings.level.parse::<Level>().unwrap_or(Level::INFO);

    if settings.json {
        let subscriber = FmtSubscriber::builder()
            .json()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Serve until `shutdown` resolves
pub async fn run_server(
    state: Arc<AppState>,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = create_router(state);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
