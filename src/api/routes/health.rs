use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;

use crate::api::state::AppState;
use crate::log_client::RequestExtras;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe: validates the log client, metrics sink, fan-out queue
/// and analytics credentials are reachable/configured before reporting
/// ready. An ambient addition; ungates nothing in the core data path.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let log_service_ok = state
        .log_client
        .head_stream("__readiness__", RequestExtras::default())
        .await
        .is_ok();

    let analytics_configured = state.oracle.has_credentials();
    let fanout_queue_configured = state.fanout_queue.is_some();
    let draining = state.shutdown.is_triggered();

    let ready = log_service_ok && !draining;

    let body = json!({
        "status": if ready { "ok" } else { "unavailable" },
        "logService": log_service_ok,
        "analyticsConfigured": analytics_configured,
        "fanoutQueueConfigured": fanout_queue_configured,
        "sessionTtlSeconds": state.session_ttl_seconds,
        "draining": draining,
    });

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body))
}
