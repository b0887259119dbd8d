use chrono::Utc;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Instant;

use crate::models::job::{DeliveredAsset, ItemStage, ProcessOutcome};
use crate::models::settings::PipelineSettings;
use crate::services::compression::CompressionClient;
use crate::services::delivery::{self, DeliveryError, DeliverySink, Payload};
use crate::services::fetch::{self, FetchError, SourceFetcher};
use crate::services::ledger::StatusLedger;
use crate::services::store::{KeyValueStore, StoreError};

/// Why compression is not attempted for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    CompressionDisabled,
    MissingApiKey,
    BothDimensionsSet,
}

/// What to do with an image once it has been fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionPlan {
    Original(SkipReason),
    CompressOnly,
    Resize {
        width: Option<u32>,
        height: Option<u32>,
    },
}

/// Pick the compression path from the current settings.
pub fn plan_compression(settings: &PipelineSettings) -> CompressionPlan {
    if !settings.compression_enabled {
        return CompressionPlan::Original(SkipReason::CompressionDisabled);
    }
    if !settings.has_api_key() {
        return CompressionPlan::Original(SkipReason::MissingApiKey);
    }

    match (settings.target_width(), settings.target_height()) {
        (Some(_), Some(_)) => CompressionPlan::Original(SkipReason::BothDimensionsSet),
        (None, None) => CompressionPlan::CompressOnly,
        (width, height) => CompressionPlan::Resize { width, height },
    }
}

/// Drives one image through fetch, optional compression, delivery and ledger updates.
pub struct PipelineOrchestrator {
    settings: Arc<dyn KeyValueStore>,
    ledger: Arc<StatusLedger>,
    fetcher: SourceFetcher,
    sink: Arc<dyn DeliverySink>,
    http: Client,
    compression_base_url: Url,
}

impl PipelineOrchestrator {
    pub fn new(
        settings: Arc<dyn KeyValueStore>,
        ledger: Arc<StatusLedger>,
        http: Client,
        sink: Arc<dyn DeliverySink>,
        compression_base_url: Url,
    ) -> Self {
        Self {
            settings,
            ledger,
            fetcher: SourceFetcher::new(http.clone()),
            sink,
            http,
            compression_base_url,
        }
    }

    /// Process one image.
    ///
    /// A `job_id` marks a retry: the image's earlier failure record is cleared
    /// first. Compression failures fall back to the original image and are
    /// only visible in the ledger; fetch and delivery failures are recorded
    /// and returned.
    pub async fn process(
        &self,
        source_url: &str,
        job_id: Option<&str>,
    ) -> Result<ProcessOutcome, PipelineError> {
        let start = Instant::now();

        let settings = PipelineSettings::load(self.settings.as_ref()).await?;
        if !settings.enabled {
            tracing::warn!(url = %source_url, "Pipeline disabled, rejecting image");
            return Err(PipelineError::Disabled);
        }

        if let Some(job_id) = job_id {
            tracing::info!(url = %source_url, job_id = %job_id, "Retrying image");
            self.ledger.remove_failure(source_url).await?;
        }

        match self.run(source_url, &settings).await {
            Ok(outcome) => {
                self.ledger.mark_processed().await?;

                metrics::counter!("images_processed_total").increment(1);
                metrics::histogram!("image_pipeline_seconds").record(start.elapsed().as_secs_f64());

                tracing::info!(
                    url = %source_url,
                    stage = %ItemStage::Done,
                    asset = %outcome.asset,
                    destination = %outcome.destination,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Image processed"
                );
                Ok(outcome)
            }
            Err(e) => {
                metrics::counter!("images_failed_total").increment(1);
                tracing::error!(
                    url = %source_url,
                    stage = %ItemStage::Failed,
                    error = %e,
                    "Image processing failed"
                );

                if let Err(ledger_err) = self.ledger.add_failure(source_url, &e.to_string()).await {
                    tracing::error!(url = %source_url, error = %ledger_err, "Failed to record failure");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        source_url: &str,
        settings: &PipelineSettings,
    ) -> Result<ProcessOutcome, PipelineError> {
        tracing::debug!(url = %source_url, stage = %ItemStage::Fetching, "Fetching source image");
        let original = self.fetcher.fetch(source_url).await?;

        match fetch::probe_dimensions(&original) {
            Ok((width, height)) => {
                tracing::debug!(url = %source_url, width, height, bytes = original.len(), "Source image fetched");
            }
            Err(e) => {
                tracing::debug!(url = %source_url, error = %e, "Could not read source image dimensions");
            }
        }

        let compressed = self.compress(source_url, &original, settings).await;

        let filename = delivery::generate_filename(source_url, Utc::now().timestamp_millis());
        let destination = delivery::destination_path(&settings.download_path, &filename);

        let (payload, asset, delivered_bytes) = match compressed {
            Some(bytes) => {
                let len = bytes.len();
                (Payload::Bytes(bytes), DeliveredAsset::Compressed, Some(len))
            }
            None => (
                Payload::Url(source_url.to_string()),
                DeliveredAsset::Original,
                None,
            ),
        };

        tracing::debug!(
            url = %source_url,
            stage = %ItemStage::Delivering,
            asset = %asset,
            filename = %filename,
            "Delivering image"
        );
        self.sink
            .deliver(payload, &filename, &settings.download_path)
            .await?;

        Ok(ProcessOutcome {
            source_url: source_url.to_string(),
            filename,
            destination,
            asset,
            original_bytes: original.len(),
            delivered_bytes,
        })
    }

    /// Run the remote compression step. `None` means "deliver the original".
    async fn compress(
        &self,
        source_url: &str,
        original: &[u8],
        settings: &PipelineSettings,
    ) -> Option<Vec<u8>> {
        let resize = match plan_compression(settings) {
            CompressionPlan::Original(SkipReason::BothDimensionsSet) => {
                tracing::error!(
                    url = %source_url,
                    target_width = ?settings.target_width(),
                    target_height = ?settings.target_height(),
                    "Both target width and height are configured, skipping compression"
                );
                return None;
            }
            CompressionPlan::Original(reason) => {
                tracing::debug!(url = %source_url, reason = %reason, "Compression skipped");
                return None;
            }
            CompressionPlan::CompressOnly => None,
            CompressionPlan::Resize { width, height } => Some((width, height)),
        };

        tracing::debug!(
            url = %source_url,
            stage = %ItemStage::Compressing,
            "Sending image to compression service"
        );

        let result = match CompressionClient::new(
            self.http.clone(),
            self.compression_base_url.clone(),
            &settings.api_key,
        ) {
            Ok(client) => match resize {
                Some((width, height)) => {
                    client
                        .compress_and_resize(original, width.map(f64::from), height.map(f64::from))
                        .await
                }
                None => client.compress(original).await,
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                metrics::counter!("images_compressed_total").increment(1);
                tracing::info!(
                    url = %source_url,
                    original_bytes = original.len(),
                    compressed_bytes = bytes.len(),
                    "Image compressed"
                );
                Some(bytes)
            }
            Err(e) => {
                metrics::counter!("compression_fallbacks_total").increment(1);
                tracing::warn!(url = %source_url, error = %e, "Compression failed, delivering original image");

                if let Err(ledger_err) = self.ledger.add_failure(source_url, &e.to_string()).await {
                    tracing::error!(url = %source_url, error = %ledger_err, "Failed to record failure");
                }
                None
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline is disabled")]
    Disabled,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Status store error: {0}")]
    Store(#[from] StoreError),
}
