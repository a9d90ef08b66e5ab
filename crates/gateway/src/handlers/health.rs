//! Health check handlers

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub backend: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up(latency_ms: u64) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn down(error: String) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error),
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: ragline_common::VERSION.to_string(),
    })
}

/// Readiness probe - checks the database and the answering backend.
///
/// Only the database gates readiness. With the backend down the exchange
/// routes fail per-request while chat history and analytics keep working,
/// so its check is reported without flipping the status.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let started = std::time::Instant::now();
    let database = match state.db.ping().await {
        Ok(_) => CheckResult::up(started.elapsed().as_millis() as u64),
        Err(e) => CheckResult::down(e.to_string()),
    };

    let started = std::time::Instant::now();
    let backend = match state.answerer.list_models().await {
        Ok(_) => CheckResult::up(started.elapsed().as_millis() as u64),
        Err(e) => CheckResult::down(e.to_string()),
    };

    let status = if database.is_up() { "ready" } else { "not_ready" };

    Json(ReadyResponse {
        status: status.to_string(),
        checks: HealthChecks { database, backend },
    })
}
