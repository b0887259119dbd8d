use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single image that could not be processed, kept for later retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub url: String,
    pub error: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
}

impl FailureRecord {
    pub fn new(url: &str, error: &str) -> Self {
        Self {
            url: url.to_string(),
            error: error.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Running progress of the current batch of images.
///
/// Only mutated through [`StatusLedger`](crate::services::ledger::StatusLedger),
/// which serializes every read-modify-write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JobStatus {
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub failed_images: Vec<FailureRecord>,
}

impl JobStatus {
    /// Append a failure, replacing any earlier record for the same URL.
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failed_images.retain(|existing| existing.url != record.url);
        self.failed_images.push(record);
        self.failed = self.failed_images.len() as u64;
    }

    /// Drop the failure record for `url`. Returns whether one existed.
    pub fn remove_failure(&mut self, url: &str) -> bool {
        let before = self.failed_images.len();
        self.failed_images.retain(|existing| existing.url != url);
        self.failed = self.failed_images.len() as u64;
        before != self.failed_images.len()
    }

    /// Restore `failed == failed_images.len()` and `processed + failed <= total`.
    ///
    /// Returns the previous total when it had to be raised.
    pub fn reconcile(&mut self) -> Option<u64> {
        self.failed = self.failed_images.len() as u64;
        let observed = self.processed + self.failed;
        if observed > self.total {
            let previous = self.total;
            self.total = observed;
            return Some(previous);
        }
        None
    }

    pub fn failure_for(&self, url: &str) -> Option<&FailureRecord> {
        self.failed_images.iter().find(|record| record.url == url)
    }
}
