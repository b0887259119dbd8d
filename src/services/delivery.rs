use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::path::{Component, Path, PathBuf};

const FILENAME_PREFIX: &str = "image";
const KNOWN_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// What gets handed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Final image bytes, e.g. from the compression service.
    Bytes(Vec<u8>),
    /// The original source, forwarded by URL.
    Url(String),
}

/// Persists a delivered image under `download_path/filename`.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(
        &self,
        payload: Payload,
        filename: &str,
        download_path: &str,
    ) -> Result<(), DeliveryError>;
}

/// Sink writing into a directory on the local filesystem.
pub struct FsSink {
    root: PathBuf,
    http: Client,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>, http: Client) -> Self {
        Self {
            root: root.into(),
            http,
        }
    }
}

#[async_trait]
impl DeliverySink for FsSink {
    async fn deliver(
        &self,
        payload: Payload,
        filename: &str,
        download_path: &str,
    ) -> Result<(), DeliveryError> {
        let relative = destination_path(download_path, filename);
        let target = self.root.join(checked_relative(&relative)?);

        let bytes = match payload {
            Payload::Bytes(bytes) => bytes,
            Payload::Url(url) => download(&self.http, &url).await?,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;

        tracing::info!(path = %target.display(), bytes = bytes.len(), "Image written");
        Ok(())
    }
}

/// Fetch a forwarded source for sinks that can only store bytes.
pub(crate) async fn download(http: &Client, url: &str) -> Result<Vec<u8>, DeliveryError> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DeliveryError::Source(status));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Reject absolute paths and parent traversal in a sink-relative path.
pub(crate) fn checked_relative(relative: &str) -> Result<&Path, DeliveryError> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes || relative.is_empty() {
        return Err(DeliveryError::InvalidPath(relative.to_string()));
    }
    Ok(path)
}

/// `download_path/filename` with repeated slashes collapsed.
pub fn destination_path(download_path: &str, filename: &str) -> String {
    if download_path.is_empty() {
        return filename.to_string();
    }

    let joined = format!("{download_path}/{filename}");
    let mut collapsed = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}

/// Name for a delivered image, keeping a known image extension from the source URL.
pub fn generate_filename(source_url: &str, timestamp_ms: i64) -> String {
    let extension = Url::parse(source_url)
        .ok()
        .and_then(|url| known_extension(url.path()))
        .unwrap_or_else(|| "jpg".to_string());
    format!("{FILENAME_PREFIX}_{timestamp_ms}.{extension}")
}

fn known_extension(path: &str) -> Option<String> {
    let (_, extension) = path.rsplit_once('.')?;
    KNOWN_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(extension))
        .then(|| extension.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Delivery failed: source returned {0}")]
    Source(StatusCode),

    #[error("Delivery failed: invalid destination {0:?}")]
    InvalidPath(String),

    #[error("Delivery failed: {0}")]
    Storage(String),
}
