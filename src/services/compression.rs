use base64::Engine;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};

use crate::models::job::ItemStage;

/// Public endpoint of the compression service.
pub const DEFAULT_BASE_URL: &str = "https://api.tinify.com";

/// The single dimension a resize is allowed to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeTarget {
    Width(u32),
    Height(u32),
}

impl ResizeTarget {
    /// Build a target from optional dimensions; exactly one must be set.
    pub fn from_dimensions(
        width: Option<f64>,
        height: Option<f64>,
    ) -> Result<Self, CompressionError> {
        match (width, height) {
            (Some(width), None) => Ok(Self::Width(round_dimension(width)?)),
            (None, Some(height)) => Ok(Self::Height(round_dimension(height)?)),
            (Some(_), Some(_)) => Err(CompressionError::Configuration(
                "only one of width or height may be set".to_string(),
            )),
            (None, None) => Err(CompressionError::Configuration(
                "one of width or height must be set".to_string(),
            )),
        }
    }

    /// True when resizing to this target would not shrink an image of `current` size.
    pub fn would_upscale(&self, current: Option<ImageDimensions>) -> bool {
        match (self, current) {
            (Self::Width(width), Some(current)) => *width >= current.width,
            (Self::Height(height), Some(current)) => *height >= current.height,
            (_, None) => false,
        }
    }

    fn instruction(&self) -> ResizeInstruction {
        match *self {
            Self::Width(width) => ResizeInstruction {
                method: "scale",
                width: Some(width),
                height: None,
            },
            Self::Height(height) => ResizeInstruction {
                method: "scale",
                width: None,
                height: Some(height),
            },
        }
    }
}

fn round_dimension(value: f64) -> Result<u32, CompressionError> {
    let rounded = value.round();
    if !value.is_finite() || rounded < 1.0 || rounded > f64::from(u32::MAX) {
        return Err(CompressionError::Configuration(format!(
            "dimension must be a positive number, got {value}"
        )));
    }
    Ok(rounded as u32)
}

/// Width and height reported by the service for a stored output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize)]
struct ResizeRequest {
    resize: ResizeInstruction,
}

#[derive(Debug, Serialize, PartialEq)]
struct ResizeInstruction {
    method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
}

#[derive(Deserialize)]
struct OutputEnvelope {
    output: Option<OutputRef>,
}

#[derive(Deserialize)]
struct OutputRef {
    url: Option<String>,
}

impl OutputEnvelope {
    fn into_url(self) -> Option<String> {
        self.output
            .and_then(|output| output.url)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

enum ResizeOutcome {
    Reference(Url),
    Bytes(Vec<u8>),
}

/// Client for the remote compress ("shrink") and resize ("scale") API.
pub struct CompressionClient {
    http: Client,
    base_url: Url,
    auth_header: String,
}

impl CompressionClient {
    pub fn new(http: Client, base_url: Url, api_key: &str) -> Result<Self, CompressionError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(CompressionError::Configuration(
                "compression API key is not configured".to_string(),
            ));
        }

        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("api:{api_key}"));

        Ok(Self {
            http,
            base_url,
            auth_header: format!("Basic {credentials}"),
        })
    }

    /// Compress without resizing.
    pub async fn compress(&self, image: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let output = self.shrink(image).await?;
        self.fetch_output(&output).await
    }

    /// Compress, then scale exactly one dimension without ever enlarging the image.
    pub async fn compress_and_resize(
        &self,
        image: &[u8],
        width: Option<f64>,
        height: Option<f64>,
    ) -> Result<Vec<u8>, CompressionError> {
        let target = ResizeTarget::from_dimensions(width, height)?;

        let output = self.shrink(image).await?;
        let current = self.probe_dimensions(&output).await;

        if target.would_upscale(current) {
            tracing::info!(
                resize = ?target,
                current = ?current,
                "Target is not smaller than the compressed image, skipping resize"
            );
            return self.fetch_output(&output).await;
        }

        match self.resize(&output, target).await? {
            ResizeOutcome::Bytes(bytes) => Ok(bytes),
            ResizeOutcome::Reference(resized) => self.fetch_output(&resized).await,
        }
    }

    /// Upload the image and return the reference to the compressed output.
    async fn shrink(&self, image: &[u8]) -> Result<Url, CompressionError> {
        let endpoint = self.resolve("shrink")?;
        tracing::debug!(bytes = image.len(), "Uploading image for compression");

        let response = self
            .http
            .post(endpoint)
            .header(AUTHORIZATION, &self.auth_header)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let message = api_error_message(response, "compress failed").await;
            tracing::warn!(status = %status, error = %message, "Compression request rejected");
            return Err(CompressionError::RemoteApi(message));
        }

        if let Some(location) = self.location(response.headers())? {
            return Ok(location);
        }

        let url = response
            .json::<OutputEnvelope>()
            .await
            .ok()
            .and_then(OutputEnvelope::into_url)
            .ok_or_else(|| {
                CompressionError::RemoteApi("compressed output location missing".to_string())
            })?;
        self.resolve(&url)
    }

    /// Read `Image-Width`/`Image-Height` for a stored output. Never fails the caller.
    async fn probe_dimensions(&self, output: &Url) -> Option<ImageDimensions> {
        match self.read_dimension_headers(output).await {
            Ok(Some(dimensions)) => {
                tracing::debug!(
                    width = dimensions.width,
                    height = dimensions.height,
                    "Compressed image dimensions"
                );
                Some(dimensions)
            }
            Ok(None) => {
                tracing::warn!(output = %output, "Compressed image dimensions unavailable");
                None
            }
            Err(e) => {
                tracing::warn!(output = %output, error = %e, "Reading compressed image dimensions failed");
                None
            }
        }
    }

    async fn read_dimension_headers(
        &self,
        output: &Url,
    ) -> Result<Option<ImageDimensions>, reqwest::Error> {
        let mut response = self
            .http
            .head(output.clone())
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .await?;

        if !response.status().is_success() {
            // Some deployments reject HEAD; only the headers of the GET are read.
            response = self
                .http
                .get(output.clone())
                .header(AUTHORIZATION, &self.auth_header)
                .send()
                .await?;
            if !response.status().is_success() {
                return Ok(None);
            }
        }

        Ok(dimensions_from_headers(response.headers()))
    }

    async fn resize(
        &self,
        output: &Url,
        target: ResizeTarget,
    ) -> Result<ResizeOutcome, CompressionError> {
        let request = ResizeRequest {
            resize: target.instruction(),
        };
        tracing::debug!(stage = %ItemStage::Resizing, resize = ?target, "Requesting resize");

        let response = self
            .http
            .post(output.clone())
            .header(AUTHORIZATION, &self.auth_header)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let message = api_error_message(response, "resize failed").await;
            tracing::warn!(status = %status, error = %message, "Resize request rejected");
            return Err(CompressionError::RemoteApi(message));
        }

        if let Some(location) = self.location(response.headers())? {
            return Ok(ResizeOutcome::Reference(location));
        }

        if is_json(response.headers()) {
            let url = response
                .json::<OutputEnvelope>()
                .await
                .ok()
                .and_then(OutputEnvelope::into_url);
            return match url {
                Some(url) => Ok(ResizeOutcome::Reference(self.resolve(&url)?)),
                None => {
                    tracing::warn!("Resize response carried no output url, using compressed output");
                    Ok(ResizeOutcome::Reference(output.clone()))
                }
            };
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        tracing::debug!(bytes = bytes.len(), "Resize returned image bytes directly");
        Ok(ResizeOutcome::Bytes(bytes.to_vec()))
    }

    async fn fetch_output(&self, output: &Url) -> Result<Vec<u8>, CompressionError> {
        let fetched = async {
            let response = self
                .http
                .get(output.clone())
                .header(AUTHORIZATION, &self.auth_header)
                .send()
                .await?
                .error_for_status()?;
            response.bytes().await
        }
        .await;

        match fetched {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(e) => {
                tracing::warn!(output = %output, error = %e, "Downloading processed image failed");
                Err(CompressionError::RemoteApi(
                    "fetch final image failed".to_string(),
                ))
            }
        }
    }

    fn location(&self, headers: &HeaderMap) -> Result<Option<Url>, CompressionError> {
        match headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            Some(location) => self.resolve(location).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve an absolute or base-relative reference.
    fn resolve(&self, reference: &str) -> Result<Url, CompressionError> {
        self.base_url.join(reference).map_err(|e| {
            CompressionError::RemoteApi(format!("invalid output url {reference}: {e}"))
        })
    }
}

fn dimensions_from_headers(headers: &HeaderMap) -> Option<ImageDimensions> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|value| *value > 0)
    };

    Some(ImageDimensions {
        width: read("image-width")?,
        height: read("image-height")?,
    })
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

/// Extract a readable cause: JSON `error`, then JSON `message`, then the raw body.
async fn api_error_message(response: Response, fallback: &str) -> String {
    let text = response.text().await.unwrap_or_default();
    parse_error_message(&text).unwrap_or_else(|| fallback.to_string())
}

fn parse_error_message(text: &str) -> Option<String> {
    match serde_json::from_str::<ApiErrorBody>(text) {
        Ok(body) => body
            .error
            .filter(|error| !error.is_empty())
            .or(body.message.filter(|message| !message.is_empty())),
        Err(_) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
    }
}

fn transport_error(error: reqwest::Error) -> CompressionError {
    if error.is_timeout() {
        CompressionError::RemoteApi("compression service timed out".to_string())
    } else {
        CompressionError::RemoteApi(format!("compression service unreachable: {error}"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("Invalid compression request: {0}")]
    Configuration(String),

    /// Cause reported by (or about) the remote service, kept verbatim for the ledger.
    #[error("{0}")]
    RemoteApi(String),
}
