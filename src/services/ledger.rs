use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::status::{FailureRecord, JobStatus};
use crate::services::store::{self, KeyValueStore, StoreError};

/// Store key holding the [`JobStatus`] document.
pub const STATUS_KEY: &str = "imageStatus";

/// Serialized access to the persisted [`JobStatus`].
///
/// Every operation holds the ledger lock across its whole read-modify-write,
/// so concurrent pipeline runs never lose updates. The lock is process-local:
/// one process must own the ledger.
pub struct StatusLedger {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl StatusLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Current snapshot; zero-valued until something has been written.
    pub async fn get_status(&self) -> Result<JobStatus, StoreError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Overwrite the expected image count.
    pub async fn set_total(&self, total: u64) -> Result<JobStatus, StoreError> {
        self.update(|status| status.total = total).await
    }

    pub async fn mark_processed(&self) -> Result<JobStatus, StoreError> {
        self.update(|status| status.processed += 1).await
    }

    /// Record a failure for `url`, replacing an earlier record for the same URL.
    pub async fn add_failure(&self, url: &str, error: &str) -> Result<JobStatus, StoreError> {
        let record = FailureRecord::new(url, error);
        self.update(move |status| status.record_failure(record)).await
    }

    pub async fn remove_failure(&self, url: &str) -> Result<JobStatus, StoreError> {
        self.update(|status| {
            if status.remove_failure(url) {
                tracing::debug!(url = %url, "Cleared failure record");
            }
        })
        .await
    }

    async fn update<F>(&self, mutate: F) -> Result<JobStatus, StoreError>
    where
        F: FnOnce(&mut JobStatus),
    {
        let _guard = self.lock.lock().await;
        let mut status = self.read().await?;
        mutate(&mut status);

        if let Some(previous) = status.reconcile() {
            tracing::warn!(
                previous_total = previous,
                total = status.total,
                processed = status.processed,
                failed = status.failed,
                "Processed and failed counts exceeded total, raising total"
            );
        }

        store::save_json(self.store.as_ref(), STATUS_KEY, &status).await?;
        Ok(status)
    }

    async fn read(&self) -> Result<JobStatus, StoreError> {
        let status: Option<JobStatus> = store::load_json(self.store.as_ref(), STATUS_KEY).await?;
        Ok(status.unwrap_or_default())
    }
}
