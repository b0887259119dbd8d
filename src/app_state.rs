use std::sync::Arc;
use std::time::Duration;

use crate::services::{
    ledger::StatusLedger, pipeline::PipelineOrchestrator, queue::JobQueue,
    store::KeyValueStore,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub ledger: Arc<StatusLedger>,
    pub pipeline: Arc<PipelineOrchestrator>,
    pub queue: Arc<JobQueue>,
    /// Upper bound on one `process` call made through the API.
    pub process_timeout: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        ledger: Arc<StatusLedger>,
        pipeline: PipelineOrchestrator,
        queue: JobQueue,
        process_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            pipeline: Arc::new(pipeline),
            queue: Arc::new(queue),
            process_timeout,
        }
    }
}
