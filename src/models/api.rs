use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// POST /api/v1/images body.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageRequest {
    #[garde(url)]
    pub url: String,

    /// Retry marker; when present the image's earlier failure record is cleared first.
    #[garde(length(min = 1, max = 128))]
    pub job_id: Option<String>,

    /// Page the image was found on, checked against the enabled sites.
    #[garde(url)]
    pub page_url: Option<String>,
}

/// POST /api/v1/images/retry body.
#[derive(Debug, Deserialize, Validate)]
pub struct RetryImageRequest {
    #[garde(url)]
    pub url: String,
}

/// PUT /api/v1/status/total body.
#[derive(Debug, Deserialize, Validate)]
pub struct SetTotalRequest {
    #[garde(range(max = 1_000_000))]
    pub count: u64,
}

/// POST /api/v1/batch body.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchRequest {
    #[garde(length(min = 1, max = 500), inner(url))]
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub queued: usize,
    pub job_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
