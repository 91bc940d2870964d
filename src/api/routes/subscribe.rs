use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::api::extractors::{validate_identifier, ProjectId};
use crate::api::state::AppState;
use crate::error::ApiError;
use crate::log_client::session_do_key;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub session_id: String,
    pub stream_id: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub session_id: String,
    pub stream_id: String,
    pub session_stream_path: String,
    pub expires_at: i64,
    pub is_new_session: bool,
}

pub async fn subscribe(
    State(state): State<AppState>,
    ProjectId(project): ProjectId,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    validate_identifier(&req.session_id)?;
    validate_identifier(&req.stream_id)?;

    let (expires_at, is_new_session) = state
        .sessions
        .touch_session(&project, &req.session_id)
        .await?;

    state
        .registry
        .get_or_create(&project, &req.stream_id)
        .add_subscriber(&req.session_id)
        .await?;

    state.metrics.emit_subscribe(&project, &req.session_id, &req.stream_id);
    if let Some(content_type) = &req.content_type {
        tracing::debug!(content_type, "subscriber requested a preferred content type");
    }

    Ok(Json(SubscribeResponse {
        session_id: req.session_id.clone(),
        stream_id: req.stream_id,
        session_stream_path: session_do_key(&project, &req.session_id),
        expires_at,
        is_new_session,
    }))
}
