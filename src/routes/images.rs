use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{ProcessImageRequest, RetryImageRequest};
use crate::models::job::ProcessOutcome;
use crate::models::settings::PipelineSettings;
use crate::routes::ApiError;

const TIMEOUT_MESSAGE: &str = "Image processing timed out";

/// POST /api/v1/images: fetch, optionally compress, and deliver one image.
pub async fn process_image(
    State(state): State<AppState>,
    Json(request): Json<ProcessImageRequest>,
) -> Result<Json<ProcessOutcome>, ApiError> {
    request.validate().map_err(ApiError::validation)?;

    if let Some(page_url) = &request.page_url {
        let settings = PipelineSettings::load(state.store.as_ref()).await?;
        if !settings.is_site_enabled(page_url) {
            return Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "Pipeline is not enabled for this site",
            ));
        }
    }

    run_with_timeout(&state, &request.url, request.job_id.as_deref()).await
}

/// POST /api/v1/images/retry: reprocess an image, clearing its failure record first.
pub async fn retry_image(
    State(state): State<AppState>,
    Json(request): Json<RetryImageRequest>,
) -> Result<Json<ProcessOutcome>, ApiError> {
    request.validate().map_err(ApiError::validation)?;

    let job_id = Uuid::new_v4().to_string();
    run_with_timeout(&state, &request.url, Some(&job_id)).await
}

async fn run_with_timeout(
    state: &AppState,
    url: &str,
    job_id: Option<&str>,
) -> Result<Json<ProcessOutcome>, ApiError> {
    match tokio::time::timeout(state.process_timeout, state.pipeline.process(url, job_id)).await {
        Ok(result) => Ok(Json(result?)),
        Err(_) => {
            tracing::warn!(url = %url, timeout_secs = state.process_timeout.as_secs(), "Image request timed out");
            // The dropped run never reached its own failure handling
            if let Err(e) = state.ledger.add_failure(url, TIMEOUT_MESSAGE).await {
                tracing::error!(url = %url, error = %e, "Failed to record timeout");
            }
            Err(ApiError::new(StatusCode::GATEWAY_TIMEOUT, TIMEOUT_MESSAGE))
        }
    }
}
