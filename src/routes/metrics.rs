use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics: pipeline counters in Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the pipeline emits.
pub fn describe() {
    metrics::describe_counter!("images_processed_total", "Images delivered successfully");
    metrics::describe_counter!(
        "images_failed_total",
        "Images that failed without a fallback (fetch or delivery)"
    );
    metrics::describe_counter!("images_compressed_total", "Images delivered compressed");
    metrics::describe_counter!(
        "compression_fallbacks_total",
        "Compression failures that fell back to the original image"
    );
    metrics::describe_histogram!(
        "image_pipeline_seconds",
        "Time to fetch, compress and deliver one image"
    );
    metrics::describe_gauge!("batch_queue_depth", "Images waiting in the batch queue");
}
