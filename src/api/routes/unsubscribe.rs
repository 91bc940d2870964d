use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::api::extractors::{validate_identifier, ProjectId};
use crate::api::state::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRequest {
    pub session_id: String,
    pub stream_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeResponse {
    pub unsubscribed: bool,
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    ProjectId(project): ProjectId,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    validate_identifier(&req.session_id)?;
    validate_identifier(&req.stream_id)?;

    // No actor has ever been created for this stream, so there is nothing
    // to remove; skip standing one up just to immediately no-op.
    let unsubscribed = match state.registry.get(&project, &req.stream_id) {
        Some(actor) => {
            actor.remove_subscriber(&req.session_id).await?;
            true
        }
        None => false,
    };

    if unsubscribed {
        state.metrics.emit_unsubscribe(&project, &req.session_id, &req.stream_id);
    }

    Ok(Json(UnsubscribeResponse { unsubscribed }))
}
