//! CORS, bearer-auth gate, and the catch-all 404 handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::core::config::AllowedOrigins;
use crate::error::{ApiError, FabricError};

/// Build a `CorsLayer` from the configured allowed origins. CORS is applied
/// after a response (cached or fresh) is materialized; the cache layer
/// itself never stores CORS headers.
pub fn cors(allowed: &AllowedOrigins) -> CorsLayer {
    let allow_origin = match allowed {
        AllowedOrigins::Any => AllowOrigin::any(),
        AllowedOrigins::List(origins) => {
            let values: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            AllowOrigin::list(values)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
            axum::http::header::CACHE_CONTROL,
            axum::http::header::IF_NONE_MATCH,
            "X-Project-Id".parse().unwrap(),
            "X-Debug-Coalesce".parse().unwrap(),
            "Producer-Id".parse().unwrap(),
            "Producer-Epoch".parse().unwrap(),
            "Producer-Seq".parse().unwrap(),
        ])
}

pub async fn handle_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

/// Enforce `AUTH_TOKEN` (`I`/§6) on every northbound route: if a token is
/// configured, requests must carry a matching `Authorization: Bearer` header.
/// Does not reveal which check failed, per §7's `auth` policy.
pub async fn require_bearer(
    State(expected): State<Arc<Option<String>>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = expected.as_ref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(ApiError::from(FabricError::Auth)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_any_does_not_panic() {
        let _ = cors(&AllowedOrigins::Any);
    }

    #[test]
    fn test_cors_list_does_not_panic() {
        let _ = cors(&AllowedOrigins::List(vec!["https://example.com".into()]));
    }
}
