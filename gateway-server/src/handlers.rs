//! HTTP handlers: run, health, stats, metrics.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gateway_engine::{ExecuteRequest, Language};

use crate::error::{ApiError, ValidatedJson};
use crate::state::AppState;

// ═══════════════════════════════════════════════════════════════════════
//  POST /api/run
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub language: String,
    #[serde(default)]
    pub version: Option<String>,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub cached: bool,
}

pub async fn run(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let language = Language::parse(&body.language)
        .ok_or_else(|| ApiError::BadRequest(format!("unsupported language: {}", body.language)))?;

    let request = ExecuteRequest {
        language,
        version: body.version.unwrap_or_else(|| "latest".to_string()),
        source: body.code.into_bytes(),
    };

    tracing::debug!(%language, "api: dispatching run request");

    let result = state.engine.execute(request).await?;

    Ok(Json(RunResponse {
        stdout: result.stdout,
        stderr: result.stderr,
        exit_code: result.exit_code,
        duration_ms: result.duration_ms,
        cached: result.cached,
    }))
}

// ═══════════════════════════════════════════════════════════════════════
//  GET /health
// ═══════════════════════════════════════════════════════════════════════

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let stats = state.engine.stats();
    // Spec §6.1: "healthy" when load < 90%, else "degraded".
    let healthy = stats.load_percent < 90.0;

    Json(json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": stats.uptime_secs,
        "stats": stats,
    }))
}

// ═══════════════════════════════════════════════════════════════════════
//  GET /api/stats
// ═══════════════════════════════════════════════════════════════════════

pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.engine.stats()).unwrap_or_else(|_| json!({"error": "serialization failed"})))
}

// ═══════════════════════════════════════════════════════════════════════
//  GET /api/metrics
// ═══════════════════════════════════════════════════════════════════════

pub async fn metrics(State(state): State<AppState>) -> String {
    gateway_engine::metrics::render(&state.engine.stats())
}
