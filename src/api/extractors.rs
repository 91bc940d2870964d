//! Request extractors: tenant identification and identifier validation.

use std::sync::LazyLock;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use regex::Regex;

use crate::core::constants::IDENTIFIER_PATTERN;
use crate::error::{ApiError, FabricError};

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(IDENTIFIER_PATTERN).unwrap());

pub fn validate_identifier(value: &str) -> Result<(), FabricError> {
    if value.is_empty() || !IDENTIFIER_RE.is_match(value) {
        return Err(FabricError::validation(format!(
            "'{}' is not a valid identifier",
            value
        )));
    }
    Ok(())
}

/// Tenant identity, carried on every request via `X-Project-Id`. CORS/JWT
/// enforcement around this header is out of scope; this extractor only
/// validates its shape.
pub struct ProjectId(pub String);

impl<S> FromRequestParts<S> for ProjectId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let project = parts
            .headers
            .get("X-Project-Id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::bad_request("MISSING_PROJECT", "X-Project-Id header is required"))?
            .to_string();

        validate_identifier(&project)?;
        Ok(ProjectId(project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_accepts_allowed_chars() {
        assert!(validate_identifier("session-123_abc.x:y").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_slash() {
        assert!(validate_identifier("a/b").is_err());
    }
}
