use serde::{Deserialize, Serialize};

/// Stage of a single image moving through the pipeline, as it appears in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ItemStage {
    Fetching,
    Compressing,
    Resizing,
    Delivering,
    Done,
    Failed,
}

/// How the delivered asset was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveredAsset {
    /// Bytes returned by the compression service.
    Compressed,
    /// The untouched source, forwarded by URL.
    Original,
}

/// Result of one successful `process` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub source_url: String,
    pub filename: String,
    /// Path relative to the sink root.
    pub destination: String,
    pub asset: DeliveredAsset,
    pub original_bytes: usize,
    /// Size of the compressed payload, when one was delivered.
    pub delivered_bytes: Option<usize>,
}
