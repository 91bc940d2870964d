use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::api::extractors::{validate_identifier, ProjectId};
use crate::api::state::AppState;
use crate::cache::{cache_key, store_decision, CacheStatus, CachedResponse};
use crate::cache::policy::OriginExchange;
use crate::error::ApiError;
use crate::log_client::{do_key, RequestExtras};

pub async fn read(
    State(state): State<AppState>,
    ProjectId(project): ProjectId,
    Path(stream_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    validate_identifier(&stream_id)?;

    let mut sorted_query: Vec<(String, String)> = query.clone().into_iter().collect();
    sorted_query.sort();
    let path = format!("/v1/read/{}", stream_id);
    let canonical_url = crate::cache::key::canonicalize_url(&path, &sorted_query);
    let key = cache_key("GET", &canonical_url);

    let debug_coalesce = headers.contains_key("X-Debug-Coalesce");
    let request_no_cache = headers
        .get(axum::http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("no-cache"));
    let if_none_match = headers
        .get(axum::http::header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if !debug_coalesce && !request_no_cache {
        if let Some(cached) = state.edge_cache.get(&key).await {
            if let (Some(etag), Some(inm)) = (cached.etag(), if_none_match.as_deref()) {
                if etag == inm {
                    let mut response =
                        (axum::http::StatusCode::NOT_MODIFIED, ()).into_response();
                    response
                        .headers_mut()
                        .insert("ETag", axum::http::HeaderValue::from_str(etag).unwrap());
                    response
                        .headers_mut()
                        .insert(axum::http::header::CACHE_CONTROL, "max-age=0".parse().unwrap());
                    return Ok(response);
                }
            }
            return Ok(materialize(cached, Some(CacheStatus::Hit)));
        }
    }

    let is_long_poll = query.get("live").map(String::as_str) == Some("long-poll");
    let offset_is_now = query.get("offset").map(String::as_str) == Some("now");
    let do_key_value = do_key(&project, &stream_id);
    let query_for_fetch = sorted_query.clone();
    let log_client = state.log_client.clone();
    let fetch = move || {
        let do_key_value = do_key_value.clone();
        let query_for_fetch = query_for_fetch.clone();
        async move {
            let mut extras = RequestExtras::default();
            for (k, v) in &query_for_fetch {
                extras = extras.with_query(k.clone(), v.clone());
            }
            if is_long_poll {
                extras = extras.with_timeout(std::time::Duration::from_secs(
                    crate::core::constants::LONG_POLL_TIMEOUT_SECS + 5,
                ));
            }
            let resp = log_client.read_stream(&do_key_value, extras).await?;
            let origin = CachedResponse {
                status: resp.status.as_u16(),
                headers: resp.headers.clone(),
                body: resp.body.clone(),
            };

            let exchange = OriginExchange {
                method: "GET".to_string(),
                status: origin.status,
                origin_cache_control: origin.header("Cache-Control").map(|s| s.to_string()),
                debug_coalesce: false,
                content_type: origin.header("Content-Type").map(|s| s.to_string()),
                offset_is_now,
                is_long_poll,
                stream_up_to_date: origin.header("Stream-Up-To-Date") == Some("true"),
                ttl_remaining_secs: origin
                    .header("Stream-Expires-At")
                    .and_then(|v| v.parse::<i64>().ok())
                    .map(|expires_at| {
                        let remaining = expires_at - chrono::Utc::now().timestamp_millis();
                        (remaining.max(0) / 1000) as u64
                    }),
            };

            let to_store = if let crate::cache::StoreDecision::Store { cache_control } = store_decision(&exchange) {
                let mut stored = origin.clone();
                stored
                    .headers
                    .retain(|(k, _)| !k.eq_ignore_ascii_case("Cache-Control"));
                stored.headers.push(("Cache-Control".into(), cache_control));
                Some(stored)
            } else {
                None
            };

            Ok((origin, to_store))
        }
    };

    let (origin, performed_own_fetch) = if debug_coalesce {
        let (origin, _) = fetch().await?;
        (origin, true)
    } else {
        state.edge_cache.get_or_coalesce(&key, fetch).await?
    };

    let cache_status = if debug_coalesce {
        None
    } else if request_no_cache {
        Some(CacheStatus::Bypass)
    } else if performed_own_fetch {
        Some(CacheStatus::Miss)
    } else {
        Some(CacheStatus::Hit)
    };

    Ok(materialize(origin, cache_status))
}

fn materialize(entry: CachedResponse, cache_status: Option<CacheStatus>) -> Response {
    let status = axum::http::StatusCode::from_u16(entry.status)
        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, entry.body).into_response();
    let response_headers = response.headers_mut();
    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::try_from(name.as_str()),
            axum::http::HeaderValue::from_str(value),
        ) {
            response_headers.insert(name, value);
        }
    }
    if let Some(status) = cache_status {
        response_headers.insert("X-Cache", status.as_header_value().parse().unwrap());
    }
    response
}
