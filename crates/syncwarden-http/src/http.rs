//! HTTP control API for the sync supervisor.
//!
//! Routes:
//! - `GET /`           health, unauthenticated
//! - `POST /sync`      start a job (optional `{"token": ...}` body)
//! - `POST /cancel`    request cancellation of the active job
//! - `GET /status`     latest record, or `?history=true` for recent records
//! - `DELETE /history` clear all records while idle

use crate::auth::require_api_secret;
use crate::protocol::{
    CancelResponse, ClearResponse, ErrorResponse, HealthResponse, IdleResponse, StartResponse,
    SyncRequest,
};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router, middleware};
use serde::Deserialize;
use std::sync::Arc;
use syncwarden_core::config::Config;
use syncwarden_core::error::{ProtocolErrorCode, SupervisorError};
use syncwarden_core::types::{StoreHealth, sync_direction};
use syncwarden_supervisor::{CancelOutcome, JobManager, StatusView};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared state for the HTTP transport.
pub struct HttpState {
    pub config: Arc<Config>,
    pub manager: Arc<JobManager>,
}

impl HttpState {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self {
            config: Arc::clone(manager.config()),
            manager,
        }
    }

    fn direction(&self) -> String {
        sync_direction(&self.config.sync.source, &self.config.sync.destination)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("shutdown task failed: {0}")]
    Shutdown(String),
}

pub fn build_router(state: Arc<HttpState>) -> Router {
    let control = Router::new()
        .route("/sync", post(sync_handler))
        .route("/cancel", post(cancel_handler))
        .route("/status", get(status_handler))
        .route("/history", delete(clear_history_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_api_secret,
        ));

    Router::new()
        .route("/", get(health_handler))
        .merge(control)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reconcile interrupted jobs, then serve the control API until ctrl-c or
/// SIGTERM. The active job is cancelled on the way out.
pub async fn run_http_server(config: Arc<Config>, bind_addr: &str, port: u16) -> Result<(), HttpError> {
    let manager = Arc::new(JobManager::open(Arc::clone(&config))?);

    // Must finish before the listener accepts its first request.
    let reconciled = manager.reconcile_on_startup()?;
    if reconciled > 0 {
        info!(count = reconciled, "Marked interrupted jobs from previous session");
    }
    if config.api_secret().is_none() {
        warn!("API secret not set; control endpoints are unauthenticated");
    }

    let app = build_router(Arc::new(HttpState::new(Arc::clone(&manager))));

    let addr = format!("{}:{}", bind_addr, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| HttpError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(
        direction = %sync_direction(&config.sync.source, &config.sync.destination),
        "Sync control API listening on {}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Control API stopped; shutting down supervisor");
    let idle = tokio::task::spawn_blocking(move || manager.shutdown())
        .await
        .map_err(|e| HttpError::Shutdown(e.to_string()))?;
    if !idle {
        warn!("Exiting with a sync job still running");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// GET /: liveness, sync direction and job database health.
async fn health_handler(State(state): State<Arc<HttpState>>) -> Json<HealthResponse> {
    let manager = Arc::clone(&state.manager);
    let store = tokio::task::spawn_blocking(move || manager.store().health())
        .await
        .unwrap_or_else(|e| StoreHealth::unavailable(format!("internal error: {}", e)));
    if !store.ok {
        warn!(error = ?store.error, "Job database health check failed");
    }

    Json(HealthResponse {
        status: "online".into(),
        direction: state.direction(),
        active_job_id: state.manager.active_job_id(),
        store,
    })
}

/// POST /sync: admit a job unless one is running.
async fn sync_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        match serde_json::from_slice::<SyncRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    ProtocolErrorCode::InvalidInput,
                    format!("Invalid JSON request body: {}", e),
                );
            }
        }
    };

    let direction = state.direction();
    let manager = Arc::clone(&state.manager);
    match run_blocking(move || manager.start(request.token)).await {
        Ok(outcome) => Json(StartResponse::from_outcome(&outcome, &direction)).into_response(),
        Err(response) => response,
    }
}

/// POST /cancel: fire-and-forget termination request.
async fn cancel_handler(State(state): State<Arc<HttpState>>) -> Response {
    let manager = Arc::clone(&state.manager);
    match run_blocking(move || manager.cancel()).await {
        Ok(outcome) => {
            let status = match outcome {
                CancelOutcome::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::OK,
            };
            (status, Json(CancelResponse::from_outcome(&outcome))).into_response()
        }
        Err(response) => response,
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    history: bool,
}

/// GET /status: latest record, or recent history newest first.
async fn status_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let manager = Arc::clone(&state.manager);
    match run_blocking(move || manager.status(query.history)).await {
        Ok(StatusView::Idle) => Json(IdleResponse::default()).into_response(),
        Ok(StatusView::Latest(job)) => Json(job).into_response(),
        Ok(StatusView::History(jobs)) => Json(jobs).into_response(),
        Err(response) => response,
    }
}

/// DELETE /history: remove every record while no job runs.
async fn clear_history_handler(State(state): State<Arc<HttpState>>) -> Response {
    let manager = Arc::clone(&state.manager);
    match run_blocking(move || manager.clear_history()).await {
        Ok(outcome) => Json(ClearResponse::from_outcome(&outcome)).into_response(),
        Err(response) => response,
    }
}

/// Run a job-manager call off the async runtime; failures become a 500.
async fn run_blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> Result<T, SupervisorError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(error = %e, "Job manager call failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ProtocolErrorCode::InternalError,
                e.to_string(),
            ))
        }
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ProtocolErrorCode::InternalError,
            format!("internal error: {}", e),
        )),
    }
}

fn error_response(status: StatusCode, code: ProtocolErrorCode, message: String) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}
