use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::api::extractors::{validate_identifier, ProjectId};
use crate::api::state::AppState;
use crate::error::{ApiError, FabricError};
use crate::session::SessionInfo;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchResponse {
    pub session_id: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub session_id: String,
    pub deleted: bool,
}

pub async fn get_session(
    State(state): State<AppState>,
    ProjectId(project): ProjectId,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    validate_identifier(&session_id)?;

    match state.sessions.get_session(&project, &session_id).await? {
        Some(info) => Ok(Json(info)),
        None => Err(FabricError::not_found("session not found").into()),
    }
}

pub async fn touch_session(
    State(state): State<AppState>,
    ProjectId(project): ProjectId,
    Path(session_id): Path<String>,
) -> Result<Json<TouchResponse>, ApiError> {
    validate_identifier(&session_id)?;

    let (expires_at, _is_new) = state.sessions.touch_session(&project, &session_id).await?;

    Ok(Json(TouchResponse {
        session_id,
        expires_at,
    }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    ProjectId(project): ProjectId,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    validate_identifier(&session_id)?;

    state.sessions.delete_session(&project, &session_id).await?;

    Ok(Json(DeleteResponse {
        session_id,
        deleted: true,
    }))
}
