use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::api::extractors::{validate_identifier, ProjectId};
use crate::api::state::AppState;
use crate::error::ApiError;

pub async fn publish(
    State(state): State<AppState>,
    ProjectId(project): ProjectId,
    Path(stream_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    validate_identifier(&stream_id)?;

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let producer_id = header_str(&headers, "Producer-Id");
    let producer_epoch = header_str(&headers, "Producer-Epoch");
    let producer_seq = header_str(&headers, "Producer-Seq").and_then(|s| s.parse::<u64>().ok());

    let outcome = state
        .registry
        .get_or_create(&project, &stream_id)
        .publish(body.to_vec(), content_type, producer_id, producer_epoch, producer_seq)
        .await?;

    let status = axum::http::StatusCode::from_u16(outcome.status)
        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = (status, outcome.body).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert("X-Fanout-Count", outcome.fanout_count.into());
    response_headers.insert("X-Fanout-Successes", outcome.fanout_successes.into());
    response_headers.insert("X-Fanout-Failures", outcome.fanout_failures.into());
    response_headers.insert("X-Fanout-Mode", outcome.fanout_mode.parse().unwrap());
    if let Some(next_offset) = outcome.next_offset {
        if let Ok(value) = axum::http::HeaderValue::from_str(&next_offset.to_string()) {
            response_headers.insert("X-Stream-Next-Offset", value);
        }
    }
    if let Some(content_type) = outcome.content_type {
        if let Ok(value) = axum::http::HeaderValue::from_str(&content_type) {
            response_headers.insert(axum::http::header::CONTENT_TYPE, value);
        }
    }

    Ok(response)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}
