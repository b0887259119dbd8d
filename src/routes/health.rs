use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use crate::app_state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Ok,
    Degraded,
    Error,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: Health,
    pub version: &'static str,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    /// Settings and status ledger store.
    pub store: ComponentHealth,
    /// Batch queue.
    pub queue: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: Health,
    pub latency_ms: Option<u64>,
}

/// Time a connectivity probe; failures are logged and reported, never raised.
async fn probe<F, E>(component: &str, check: F) -> ComponentHealth
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    let start = Instant::now();
    match check.await {
        Ok(()) => ComponentHealth {
            status: Health::Ok,
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(component, error = %e, "Health probe failed");
            ComponentHealth {
                status: Health::Error,
                latency_ms: None,
            }
        }
    }
}

/// GET /health: store and queue connectivity.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (store, queue) = tokio::join!(
        probe("store", state.store.ping()),
        probe("queue", state.queue.health_check()),
    );

    let healthy = store.status == Health::Ok && queue.status == Health::Ok;
    let (code, status) = if healthy {
        (StatusCode::OK, Health::Ok)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Health::Degraded)
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checks: HealthChecks { store, queue },
        }),
    )
}
