//! Shared test harness: a fake compression API and image host served by axum
//! on an ephemeral port, plus a recording delivery sink.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use reqwest::Url;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image_relay::models::settings::PipelineSettings;
use image_relay::services::delivery::{DeliveryError, DeliverySink, Payload};
use image_relay::services::ledger::StatusLedger;
use image_relay::services::pipeline::PipelineOrchestrator;
use image_relay::services::store::{KeyValueStore, MemoryStore};

pub const SOURCE_BYTES: &[u8] = b"original-image-bytes";
pub const COMPRESSED_BYTES: &[u8] = b"compressed-image-bytes";
pub const RESIZED_BYTES: &[u8] = b"resized-image-bytes";
pub const API_KEY: &str = "test-key";

/// How the fake `/shrink` endpoint answers.
#[derive(Debug, Clone)]
pub enum ShrinkReply {
    Location,
    JsonOutput,
    Error(StatusCode, String),
}

/// How the fake output endpoint reports dimensions.
#[derive(Debug, Clone, Copy)]
pub enum ProbeReply {
    Dimensions(u32, u32),
    /// HEAD answers 405; GET carries the dimension headers.
    HeadRejected(u32, u32),
    Missing,
}

/// How the fake resize endpoint answers.
#[derive(Debug, Clone)]
pub enum ResizeReply {
    Location,
    RelativeLocation,
    JsonOutput,
    JsonWithoutOutput,
    DirectBytes,
    Error(StatusCode, String),
}

#[derive(Debug, Clone)]
pub struct RemoteBehavior {
    pub shrink: ShrinkReply,
    pub probe: ProbeReply,
    pub resize: ResizeReply,
    pub final_fetch_fails: bool,
    pub source_status: StatusCode,
}

impl Default for RemoteBehavior {
    fn default() -> Self {
        Self {
            shrink: ShrinkReply::Location,
            probe: ProbeReply::Dimensions(1200, 900),
            resize: ResizeReply::Location,
            final_fetch_fails: false,
            source_status: StatusCode::OK,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedCall {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

struct FakeState {
    base_url: String,
    behavior: Mutex<RemoteBehavior>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeState {
    fn behavior(&self) -> RemoteBehavior {
        self.behavior.lock().unwrap().clone()
    }

    fn record(&self, method: Method, path: String, headers: &HeaderMap, body: &[u8]) {
        let read = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path,
            authorization: read(header::AUTHORIZATION),
            content_type: read(header::CONTENT_TYPE),
            body: body.to_vec(),
        });
    }

    fn output_url(&self, id: &str) -> String {
        format!("{}/output/{id}", self.base_url)
    }
}

/// Handle to a running fake remote.
pub struct FakeRemote {
    pub base_url: String,
    state: Arc<FakeState>,
}

impl FakeRemote {
    pub async fn start(behavior: RemoteBehavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake remote");
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(FakeState {
            base_url: base_url.clone(),
            behavior: Mutex::new(behavior),
            calls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/shrink", post(shrink))
            .route(
                "/output/{id}",
                get(get_output).head(head_output).post(resize_output),
            )
            .route("/images/{name}", get(source_image))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake remote server");
        });

        Self { base_url, state }
    }

    pub fn url(&self) -> Url {
        Url::parse(&self.base_url).unwrap()
    }

    pub fn image_url(&self, name: &str) -> String {
        format!("{}/images/{name}", self.base_url)
    }

    pub fn set_behavior(&self, behavior: RemoteBehavior) {
        *self.state.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Calls made to the compression API (everything except source images).
    pub fn api_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| !call.path.starts_with("/images/"))
            .collect()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method && call.path == path)
            .collect()
    }

    /// Resize instructions received (POSTs against an output).
    pub fn resize_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == Method::POST && call.path.starts_with("/output/"))
            .collect()
    }
}

async fn shrink(State(state): State<Arc<FakeState>>, headers: HeaderMap, body: Bytes) -> Response {
    state.record(Method::POST, "/shrink".to_string(), &headers, &body);

    match state.behavior().shrink {
        ShrinkReply::Location => (
            StatusCode::CREATED,
            [(header::LOCATION, state.output_url("compressed"))],
        )
            .into_response(),
        ShrinkReply::JsonOutput => (
            StatusCode::CREATED,
            axum::Json(serde_json::json!({
                "input": {"size": body.len()},
                "output": {"url": state.output_url("compressed")}
            })),
        )
            .into_response(),
        ShrinkReply::Error(status, body) => error_response(status, body),
    }
}

async fn head_output(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(Method::HEAD, format!("/output/{id}"), &headers, &[]);

    match state.behavior().probe {
        ProbeReply::Dimensions(width, height) => dimension_headers(width, height).into_response(),
        ProbeReply::HeadRejected(..) => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        ProbeReply::Missing => StatusCode::OK.into_response(),
    }
}

async fn get_output(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(Method::GET, format!("/output/{id}"), &headers, &[]);

    let behavior = state.behavior();
    if behavior.final_fetch_fails {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let body = match id.as_str() {
        "resized" => RESIZED_BYTES,
        _ => COMPRESSED_BYTES,
    };

    match behavior.probe {
        ProbeReply::Dimensions(width, height) | ProbeReply::HeadRejected(width, height) => (
            dimension_headers(width, height),
            [(header::CONTENT_TYPE, "image/png")],
            body,
        )
            .into_response(),
        ProbeReply::Missing => ([(header::CONTENT_TYPE, "image/png")], body).into_response(),
    }
}

async fn resize_output(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(Method::POST, format!("/output/{id}"), &headers, &body);

    match state.behavior().resize {
        ResizeReply::Location => (
            StatusCode::CREATED,
            [(header::LOCATION, state.output_url("resized"))],
        )
            .into_response(),
        ResizeReply::RelativeLocation => (
            StatusCode::CREATED,
            [(header::LOCATION, "/output/resized".to_string())],
        )
            .into_response(),
        ResizeReply::JsonOutput => axum::Json(serde_json::json!({
            "output": {"url": state.output_url("resized")}
        }))
        .into_response(),
        ResizeReply::JsonWithoutOutput => {
            axum::Json(serde_json::json!({"status": "ok"})).into_response()
        }
        ResizeReply::DirectBytes => {
            ([(header::CONTENT_TYPE, "image/png")], RESIZED_BYTES).into_response()
        }
        ResizeReply::Error(status, body) => error_response(status, body),
    }
}

async fn source_image(
    State(state): State<Arc<FakeState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(Method::GET, format!("/images/{name}"), &headers, &[]);

    let status = state.behavior().source_status;
    if !status.is_success() {
        return status.into_response();
    }
    ([(header::CONTENT_TYPE, "image/png")], SOURCE_BYTES).into_response()
}

fn dimension_headers(width: u32, height: u32) -> [(&'static str, String); 2] {
    [
        ("Image-Width", width.to_string()),
        ("Image-Height", height.to_string()),
    ]
}

fn error_response(status: StatusCode, body: String) -> Response {
    let content_type = if body.trim_start().starts_with('{') {
        "application/json"
    } else {
        "text/plain"
    };
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// One call to [`RecordingSink::deliver`].
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub payload: Payload,
    pub filename: String,
    pub download_path: String,
}

/// Sink that keeps deliveries in memory, optionally failing or stalling every call.
#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<Delivery>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Sleeps for `delay` before recording each delivery.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(
        &self,
        payload: Payload,
        filename: &str,
        download_path: &str,
    ) -> Result<(), DeliveryError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(DeliveryError::Storage("disk full".to_string()));
        }
        self.deliveries.lock().unwrap().push(Delivery {
            payload,
            filename: filename.to_string(),
            download_path: download_path.to_string(),
        });
        Ok(())
    }
}

/// Orchestrator wired to the fake remote, an in-memory store and a recording sink.
pub struct Harness {
    pub remote: FakeRemote,
    pub store: Arc<dyn KeyValueStore>,
    pub ledger: Arc<StatusLedger>,
    pub sink: Arc<RecordingSink>,
    pub pipeline: Arc<PipelineOrchestrator>,
}

impl Harness {
    pub async fn new(behavior: RemoteBehavior, settings: PipelineSettings) -> Self {
        Self::with_sink(behavior, settings, RecordingSink::default()).await
    }

    pub async fn with_sink(
        behavior: RemoteBehavior,
        settings: PipelineSettings,
        sink: RecordingSink,
    ) -> Self {
        let remote = FakeRemote::start(behavior).await;
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        settings.save(store.as_ref()).await.unwrap();

        let ledger = Arc::new(StatusLedger::new(store.clone()));
        let sink = Arc::new(sink);
        let pipeline = Arc::new(PipelineOrchestrator::new(
            store.clone(),
            ledger.clone(),
            reqwest::Client::new(),
            sink.clone(),
            remote.url(),
        ));

        Self {
            remote,
            store,
            ledger,
            sink,
            pipeline,
        }
    }

    pub async fn update_settings(&self, settings: PipelineSettings) {
        settings.save(self.store.as_ref()).await.unwrap();
    }
}

/// Settings with compression on and a width target.
pub fn width_settings(width: u32) -> PipelineSettings {
    PipelineSettings {
        api_key: API_KEY.to_string(),
        target_width: Some(width),
        ..Default::default()
    }
}

/// Formatted log output emitted on the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Capture debug logs until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
