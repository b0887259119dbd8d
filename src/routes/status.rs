use axum::extract::State;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::api::SetTotalRequest;
use crate::models::status::JobStatus;
use crate::routes::ApiError;

/// GET /api/v1/status: current ledger snapshot.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<JobStatus>, ApiError> {
    Ok(Json(state.ledger.get_status().await?))
}

/// PUT /api/v1/status/total: set the expected image count for the batch.
pub async fn set_total(
    State(state): State<AppState>,
    Json(request): Json<SetTotalRequest>,
) -> Result<Json<JobStatus>, ApiError> {
    request.validate().map_err(ApiError::validation)?;
    Ok(Json(state.ledger.set_total(request.count).await?))
}
