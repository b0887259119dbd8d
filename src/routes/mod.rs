use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::models::api::ErrorResponse;
use crate::services::pipeline::PipelineError;
use crate::services::store::StoreError;

pub mod batch;
pub mod health;
pub mod images;
pub mod metrics;
pub mod status;

/// API routes sharing [`AppState`]. Middleware and `/metrics` are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/images", post(images::process_image))
        .route("/api/v1/images/retry", post(images::retry_image))
        .route("/api/v1/status", get(status::get_status))
        .route("/api/v1/status/total", put(status::set_total))
        .route("/api/v1/batch", post(batch::submit_batch))
        .route("/api/v1/batch/retry", post(batch::retry_failed))
        .with_state(state)
}

/// Error body returned by every API route.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn validation(report: garde::Report) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, report.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let status = match &error {
            PipelineError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Fetch(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Delivery(_) | PipelineError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        tracing::error!(error = %error, "Status store error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }
}
