use async_trait::async_trait;
use reqwest::Client;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use crate::services::delivery::{self, DeliveryError, DeliverySink, Payload};

/// Sink for Cloudflare R2 object storage (S3-compatible).
pub struct R2Sink {
    bucket: Box<Bucket>,
    http: Client,
}

impl R2Sink {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        http: Client,
    ) -> Result<Self, DeliveryError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| DeliveryError::Storage(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| DeliveryError::Storage(e.to_string()))?;

        Ok(Self { bucket, http })
    }
}

#[async_trait]
impl DeliverySink for R2Sink {
    async fn deliver(
        &self,
        payload: Payload,
        filename: &str,
        download_path: &str,
    ) -> Result<(), DeliveryError> {
        let key = delivery::destination_path(download_path, filename);
        delivery::checked_relative(&key)?;

        let bytes = match payload {
            Payload::Bytes(bytes) => bytes,
            Payload::Url(url) => delivery::download(&self.http, &url).await?,
        };

        self.bucket
            .put_object_with_content_type(&key, &bytes, content_type_for(filename))
            .await
            .map_err(|e| DeliveryError::Storage(e.to_string()))?;

        tracing::info!(key = %key, bytes = bytes.len(), "Image uploaded to R2");
        Ok(())
    }
}

fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("image_1.PNG"), "image/png");
        assert_eq!(content_type_for("image_1.webp"), "image/webp");
        assert_eq!(content_type_for("image_1.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "image/jpeg");
    }
}
