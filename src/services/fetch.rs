use reqwest::{Client, StatusCode};
use std::io::Cursor;

/// Downloads source images.
pub struct SourceFetcher {
    http: Client,
}

impl SourceFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Fetch the raw bytes behind `url`.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Read the natural width and height from the image header without decoding pixels.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), image::ImageError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Fetching source image timed out")]
    Timeout,

    #[error("Fetching source image failed: {0}")]
    Http(reqwest::Error),

    #[error("Fetching source image failed: {0}")]
    Status(StatusCode),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(error)
        }
    }
}
