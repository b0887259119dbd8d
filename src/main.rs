use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use reqwest::Url;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use image_relay::app_state::AppState;
use image_relay::config::AppConfig;
use image_relay::routes;
use image_relay::services::{
    delivery::{DeliverySink, FsSink},
    ledger::StatusLedger,
    pipeline::PipelineOrchestrator,
    queue::JobQueue,
    storage::R2Sink,
    store::{KeyValueStore, RedisStore},
    worker,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing image-relay server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    // Shared outbound HTTP client; the timeout bounds every remote call
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .expect("Failed to build HTTP client");

    tracing::info!("Connecting to Redis");
    let store: Arc<dyn KeyValueStore> =
        Arc::new(RedisStore::new(&config.redis_url).expect("Failed to initialize Redis store"));
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let sink: Arc<dyn DeliverySink> = match config.r2() {
        Some(r2) => {
            tracing::info!(bucket = %r2.bucket, "Delivering to R2");
            Arc::new(
                R2Sink::new(
                    r2.bucket,
                    r2.endpoint,
                    r2.access_key,
                    r2.secret_key,
                    http.clone(),
                )
                .expect("Failed to initialize R2 sink"),
            )
        }
        None => {
            tracing::info!(root = %config.download_root, "Delivering to local directory");
            Arc::new(FsSink::new(&config.download_root, http.clone()))
        }
    };

    let compression_base_url =
        Url::parse(&config.tinify_base_url).expect("Invalid compression service URL");

    let ledger = Arc::new(StatusLedger::new(store.clone()));
    let pipeline = PipelineOrchestrator::new(
        store.clone(),
        ledger.clone(),
        http,
        sink,
        compression_base_url,
    );

    let state = AppState::new(store, ledger, pipeline, queue, config.process_timeout());

    // Batch worker shares the ledger lock with the API handlers
    tokio::spawn(worker::run(
        state.queue.clone(),
        state.pipeline.clone(),
        config.worker_concurrency,
    ));

    let app = routes::router(state)
        .merge(
            Router::new()
                .route("/metrics", get(routes::metrics::prometheus_metrics))
                .with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit

    tracing::info!("Starting image-relay on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
