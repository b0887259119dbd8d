use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::services::pipeline::PipelineOrchestrator;
use crate::services::queue::{JobQueue, QueuedImage};

const POLL_INTERVAL_MS: u64 = 1000;

/// Batch worker loop: drains the queue, running up to `concurrency` images at once.
///
/// Runs inside the server process so that every ledger update goes through the
/// same [`StatusLedger`](crate::services::ledger::StatusLedger).
pub async fn run(queue: Arc<JobQueue>, pipeline: Arc<PipelineOrchestrator>, concurrency: usize) {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    tracing::info!(concurrency, "Batch worker started");

    match queue.recover_in_flight().await {
        Ok(0) => {}
        Ok(recovered) => tracing::warn!(recovered, "Requeued images left in flight by a previous run"),
        Err(e) => tracing::error!(error = %e, "Could not recover in-flight images"),
    }

    loop {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            return;
        };

        match queue.dequeue().await {
            Ok(Some(job)) => {
                let queue = queue.clone();
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    process_job(&queue, &pipeline, &job).await;
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No queued images, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Error reading batch queue, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }

        if let Ok(depth) = queue.pending().await {
            metrics::gauge!("batch_queue_depth").set(depth as f64);
        }
    }
}

/// Process one queued image. The job is completed either way; failures are
/// already in the ledger for a later retry.
pub async fn process_job(queue: &JobQueue, pipeline: &PipelineOrchestrator, job: &QueuedImage) {
    let job_id = job.job_id.to_string();
    let marker = job.retry.then_some(job_id.as_str());

    tracing::info!(job_id = %job.job_id, url = %job.url, retry = job.retry, "Processing queued image");

    match pipeline.process(&job.url, marker).await {
        Ok(outcome) => {
            tracing::info!(job_id = %job.job_id, asset = %outcome.asset, "Queued image done");
        }
        Err(e) => {
            tracing::warn!(job_id = %job.job_id, error = %e, "Queued image failed");
        }
    }

    if let Err(e) = queue.complete(job).await {
        tracing::error!(job_id = %job.job_id, error = %e, "Failed to complete queued image");
    }
}
