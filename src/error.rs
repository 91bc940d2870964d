//! Crate-wide error taxonomy
//!
//! Two layers, matching the rest of this codebase's error handling: a typed
//! `FabricError` produced by the log client, subscription actor, fan-out
//! engine and cache, and an HTTP-facing `ApiError` constructed `From` it.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Core error type shared by every component below the HTTP layer.
#[derive(Error, Debug)]
pub enum FabricError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("auth")]
    Auth,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("origin write failed with status {status}")]
    OriginWrite { status: u16 },

    #[error("fan-out delivery to subscriber failed")]
    FanoutSubscriber,

    #[error("queue enqueue rejected: {0}")]
    QueueEnqueue(String),

    #[error("analytics query failed: {0}")]
    AnalyticsQuery(String),

    #[error("cache coalesce promise rejected")]
    CacheCoalesce,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FabricError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::OriginWrite { status } if *status >= 500
        ) || matches!(self, Self::Http(_) | Self::Storage(_))
    }
}

/// HTTP-facing error, `{error, code, message}` JSON body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    Unauthorized { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Internal { code: String, message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<FabricError> for ApiError {
    fn from(e: FabricError) -> Self {
        if e.is_transient() {
            tracing::warn!(error = %e, "transient error, caller may retry");
        } else {
            tracing::error!(error = %e, "request failed");
        }

        match e {
            FabricError::Validation(msg) => {
                Self::BadRequest { code: "VALIDATION".into(), message: msg }
            }
            FabricError::Auth => Self::Unauthorized {
                code: "AUTH".into(),
                message: "authentication required".into(),
            },
            FabricError::NotFound(msg) => Self::NotFound { code: "NOT_FOUND".into(), message: msg },
            FabricError::Conflict(msg) => Self::Conflict { code: "CONFLICT".into(), message: msg },
            FabricError::OriginWrite { .. } => {
                Self::internal("ORIGIN_WRITE_FAILURE", "failed to write to stream")
            }
            FabricError::FanoutSubscriber => {
                Self::internal("FANOUT_SUBSCRIBER", "fan-out delivery failed")
            }
            FabricError::QueueEnqueue(_) => {
                Self::internal("QUEUE_ENQUEUE", "fan-out queue rejected the batch")
            }
            FabricError::AnalyticsQuery(_) => {
                Self::internal("ANALYTICS_QUERY", "analytics backend unavailable")
            }
            FabricError::CacheCoalesce => {
                Self::internal("CACHE_COALESCE", "coalesced origin fetch failed")
            }
            FabricError::Http(_) => Self::internal("INTERNAL", "log service request failed"),
            FabricError::Storage(_) => Self::internal("INTERNAL", "storage operation failed"),
            FabricError::Io(_) => Self::internal("INTERNAL", "internal io error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, "unauthorized", code, message)
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, "not_found", code, message),
            Self::Conflict { code, message } => (StatusCode::CONFLICT, "conflict", code, message),
            Self::Internal { code, message } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", code, message)
            }
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let api: ApiError = FabricError::validation("bad id").into();
        assert!(matches!(api, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let api: ApiError = FabricError::not_found("stream missing").into();
        assert!(matches!(api, ApiError::NotFound { .. }));
    }

    #[test]
    fn test_origin_write_is_transient_on_5xx() {
        assert!(FabricError::OriginWrite { status: 503 }.is_transient());
        assert!(!FabricError::OriginWrite { status: 404 }.is_transient());
    }
}
