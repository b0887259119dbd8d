use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::api::{BatchRequest, BatchResponse};
use crate::routes::ApiError;
use crate::services::queue::QueuedImage;

/// POST /api/v1/batch: set the batch total and queue every URL for the worker.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    request.validate().map_err(ApiError::validation)?;

    state.ledger.set_total(request.urls.len() as u64).await?;

    let images: Vec<QueuedImage> = request.urls.into_iter().map(QueuedImage::new).collect();
    state.queue.enqueue_all(&images).await.map_err(|e| {
        tracing::error!(error = %e, count = images.len(), "Failed to queue batch");
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Batch queue unavailable")
    })?;
    let job_ids: Vec<_> = images.iter().map(|image| image.job_id).collect();

    tracing::info!(queued = job_ids.len(), "Batch queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchResponse {
            queued: job_ids.len(),
            job_ids,
        }),
    ))
}

/// POST /api/v1/batch/retry: queue every image in the failure list for another attempt.
///
/// The batch total is left alone; each retry swaps a failure for a success or a fresh failure.
pub async fn retry_failed(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    let status = state.ledger.get_status().await?;
    let images: Vec<QueuedImage> = status
        .failed_images
        .into_iter()
        .map(|record| QueuedImage::retry(record.url))
        .collect();

    state.queue.enqueue_all(&images).await.map_err(|e| {
        tracing::error!(error = %e, count = images.len(), "Failed to queue retries");
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Batch queue unavailable")
    })?;

    tracing::info!(queued = images.len(), "Failed images queued for retry");

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchResponse {
            queued: images.len(),
            job_ids: images.iter().map(|image| image.job_id).collect(),
        }),
    ))
}
