//! HTTP API: library listing and worker job status.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use watchparty_core::JobUpdate;

use crate::server::AppState;

/// Body posted by an acquisition worker.
#[derive(Debug, Deserialize)]
pub struct JobStatusBody {
    /// Free-form status label.
    pub status: String,
    /// Progress indicator, passed through as sent.
    #[serde(default)]
    pub progress: Option<Value>,
    /// Optional detail line.
    #[serde(default)]
    pub message: Option<String>,
}

/// GET /api/library
pub async fn list_library(State(state): State<AppState>) -> Response {
    match state.catalog.list().await {
        Ok(movies) => Json(movies).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to list library");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "could not load the library" })),
            )
                .into_response()
        }
    }
}

/// POST /api/jobs/{id}/status
pub async fn post_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JobStatusBody>,
) -> StatusCode {
    info!(job_id = %id, status = %body.status, progress = ?body.progress, "job status update");
    let job = JobUpdate {
        id,
        status: body.status,
        progress: body.progress,
        message: body.message,
    };
    match state.hub.job_update(job).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "job update not delivered");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
