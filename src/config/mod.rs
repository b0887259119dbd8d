use serde::Deserialize;
use std::time::Duration;

use crate::services::compression::DEFAULT_BASE_URL;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string for the settings/status store and batch queue
    pub redis_url: String,

    /// Compression service base URL
    #[serde(default = "default_tinify_base_url")]
    pub tinify_base_url: String,

    /// Timeout applied to every outbound HTTP request
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Upper bound on a single image request served over HTTP
    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,

    /// Batch images processed at the same time
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Root directory for the filesystem sink
    #[serde(default = "default_download_root")]
    pub download_root: String,

    /// R2 bucket name; all four R2 settings select the object-storage sink
    pub r2_bucket: Option<String>,

    /// R2 endpoint URL
    pub r2_endpoint: Option<String>,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: Option<String>,
}

/// Borrowed R2 connection settings.
#[derive(Debug, PartialEq)]
pub struct R2Settings<'a> {
    pub bucket: &'a str,
    pub endpoint: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_tinify_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_process_timeout_secs() -> u64 {
    120
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_download_root() -> String {
    "downloads".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn r2(&self) -> Option<R2Settings<'_>> {
        Some(R2Settings {
            bucket: self.r2_bucket.as_deref()?,
            endpoint: self.r2_endpoint.as_deref()?,
            access_key: self.r2_access_key.as_deref()?,
            secret_key: self.r2_secret_key.as_deref()?,
        })
    }
}
