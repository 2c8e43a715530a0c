//! Run-control HTTP server.
//!
//! Exposes the stage orchestrator to front-ends: start a run, poll its
//! status, fetch the partitioned results, and read or update the
//! configuration.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::application::StageOrchestrator;
use crate::domain::errors::{ConfigError, OrchestratorError};
use crate::domain::models::ServerConfig;
use crate::domain::ports::ConfigStore;

/// Configuration for the run-control HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunControlConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Origins allowed by CORS; `*` allows any.
    pub cors_origins: Vec<String>,
}

impl Default for RunControlConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for RunControlConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            cors_origins: config.cors_origins.clone(),
        }
    }
}

/// Optional body of `POST /run`.
#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub topic: Option<String>,
}

/// Response to an accepted run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunStartedResponse {
    pub status: String,
    pub run_id: Uuid,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Shared state for the run-control server.
#[derive(Clone)]
struct AppState {
    orchestrator: StageOrchestrator,
    config_store: Arc<dyn ConfigStore>,
}

/// Run-control HTTP server.
pub struct RunControlServer {
    config: RunControlConfig,
    orchestrator: StageOrchestrator,
    config_store: Arc<dyn ConfigStore>,
}

impl RunControlServer {
    pub fn new(
        orchestrator: StageOrchestrator,
        config_store: Arc<dyn ConfigStore>,
        config: RunControlConfig,
    ) -> Self {
        Self {
            config,
            orchestrator,
            config_store,
        }
    }

    /// Build the router.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            config_store: Arc::clone(&self.config_store),
        };

        Router::new()
            .route("/run", post(start_run))
            .route("/status", get(get_status))
            .route("/results", get(get_results))
            .route("/config", get(get_config).post(update_config))
            .route("/health", get(health_check))
            .with_state(state)
            .layer(self.cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);

        if self.config.cors_origins.iter().any(|origin| origin == "*") {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = self
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(%origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }

    /// Start the server with a shutdown signal.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let router = self.build_router();

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "Run-control server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

// Handler functions

async fn health_check() -> &'static str {
    "OK"
}

async fn start_run(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<RunStartedResponse>), ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice::<RunRequest>(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", e))?
    };

    match state.orchestrator.start_run(request.topic) {
        Ok(run_id) => Ok((
            StatusCode::ACCEPTED,
            Json(RunStartedResponse {
                status: "started".to_string(),
                run_id,
            }),
        )),
        Err(err @ OrchestratorError::AlreadyRunning) => {
            Err(api_error(StatusCode::CONFLICT, "ALREADY_RUNNING", err))
        }
        Err(err) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "START_ERROR",
            err,
        )),
    }
}

async fn get_status(State(state): State<AppState>) -> Response {
    (
        [(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")],
        Json(state.orchestrator.get_status()),
    )
        .into_response()
}

async fn get_results(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.orchestrator.get_results().await {
        Ok(results) => Ok(Json(results).into_response()),
        Err(err @ OrchestratorError::NotReady) => {
            Err(api_error(StatusCode::BAD_REQUEST, "NOT_READY", err))
        }
        Err(err @ OrchestratorError::MissingOutput(_)) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "MISSING_OUTPUT",
            err,
        )),
        Err(err) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INVALID_OUTPUT",
            err,
        )),
    }
}

async fn get_config(State(state): State<AppState>) -> Result<Response, ApiError> {
    state
        .config_store
        .get()
        .await
        .map(|config| Json(config).into_response())
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", e))
}

async fn update_config(
    State(state): State<AppState>,
    Json(partial): Json<Value>,
) -> Result<Response, ApiError> {
    match state.config_store.set(partial).await {
        Ok(config) => Ok(Json(config).into_response()),
        Err(err @ ConfigError::Persist(_)) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "PERSIST_ERROR",
            err,
        )),
        Err(err) => Err(api_error(StatusCode::BAD_REQUEST, "INVALID_CONFIG", err)),
    }
}
