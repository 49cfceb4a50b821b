use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use trainhub_core::{CreateTrainingCmd, JobInfo, TrainingError};
use trainhub_engine::TrainingService;

#[derive(Clone)]
pub struct AppState {
    svc: Arc<TrainingService>,
}

pub fn router(svc: Arc<TrainingService>) -> Router {
    let state = AppState { svc };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/training", post(create_training))
        .route(
            "/v1/training/{id}",
            put(terminate_training).delete(delete_training),
        )
        .route("/v1/training/{id}/log", get(log_url))
        .route("/v1/file", get(file_url))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_training(
    State(st): State<AppState>,
    Json(cmd): Json<CreateTrainingCmd>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let job = st.svc.create(&cmd).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn terminate_training(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    st.svc.terminate(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn delete_training(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    st.svc.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn log_url(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UrlResponse>, ApiError> {
    let url = st.svc.log_download_url(&id).await?;
    Ok(Json(UrlResponse { url }))
}

async fn file_url(
    State(st): State<AppState>,
    Query(q): Query<FileQuery>,
) -> Result<Json<UrlResponse>, ApiError> {
    let url = st.svc.file_download_url(&q.path).await?;
    Ok(Json(UrlResponse { url }))
}

#[derive(Debug)]
pub struct ApiError(TrainingError);

impl From<TrainingError> for ApiError {
    fn from(value: TrainingError) -> Self {
        Self(value)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TrainingError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            TrainingError::SyncInProgress { .. }
            | TrainingError::DuplicateCreating(_)
            | TrainingError::ConcurrentUpdating(_) => StatusCode::CONFLICT,
            TrainingError::NotReady(_) => StatusCode::PRECONDITION_FAILED,
            TrainingError::AdmissionExhausted => StatusCode::TOO_MANY_REQUESTS,
            TrainingError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self.0, "request failed");
        } else {
            debug!(error = %self.0, "request rejected");
        }
        let body = Json(serde_json::json!({
            "error": self.0.to_string()
        }));
        (status, body).into_response()
    }
}
