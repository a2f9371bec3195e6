//! Service banner and the deep health probe.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET / — service banner.
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "message": format!("Welcome to {}", state.config.app.name),
        "environment": state.config.app.env,
        "status": "online",
    }))
}

/// GET /health — deep health check.
///
/// Verifies connectivity to both the Inference Engine and JotaDB; either
/// one down degrades the probe to 503.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let engine_ready = state.inference.health();
    let store_healthy = state.store.health().await.unwrap_or(false);
    let healthy = engine_ready && store_healthy;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let label = if healthy { "ok" } else { "degraded" };
    let engine_label = conn_label(engine_ready);
    let store_label = conn_label(store_healthy);

    (
        status,
        Json(serde_json::json!({
            "status": label,
            "components": {
                "inference_engine": engine_label,
                "jota_db": store_label,
            },
        })),
    )
}

fn conn_label(up: bool) -> &'static str {
    if up {
        "connected"
    } else {
        "disconnected"
    }
}
