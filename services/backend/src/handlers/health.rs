use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn detailed_health(State(state): State<AppState>) -> Json<Value> {
    let phase = state.engine.phase().await;
    let history = state.engine.history();
    let engine_healthy = phase.is_some();
    let history_healthy = history.last_flush_ok();

    Json(json!({
        "status": if engine_healthy && history_healthy { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "components": {
            "engine": {
                "status": if engine_healthy { "healthy" } else { "idle" },
                "phase": phase,
                "subscribers": state.engine.broadcaster().subscriber_count(),
            },
            "history": {
                "status": if history_healthy { "healthy" } else { "unhealthy" },
                "sink": history.sink_name(),
                "entries": history.len().await,
                "pending_flush": history.is_dirty(),
            },
        }
    }))
}
