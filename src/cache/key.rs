//! Cache key derivation: `METHOD canonical-url`.

/// Build the cache key for a request. Only `GET`/`HEAD` are ever looked up
/// against the cache; callers of other methods should skip the cache
/// entirely rather than call this.
pub fn cache_key(method: &str, canonical_url: &str) -> String {
    format!("{} {}", method.to_uppercase(), canonical_url)
}

/// Canonicalize a read URL: stable query parameter ordering so two
/// requests differing only in parameter order hit the same cache entry.
pub fn canonicalize_url(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let mut pairs: Vec<&(String, String)> = query.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let qs = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, qs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_uppercases_method() {
        assert_eq!(cache_key("get", "/v1/read/s1"), "GET /v1/read/s1");
    }

    #[test]
    fn test_canonicalize_sorts_query_params() {
        let a = canonicalize_url(
            "/v1/read/s1",
            &[("live".into(), "long-poll".into()), ("offset".into(), "5".into())],
        );
        let b = canonicalize_url(
            "/v1/read/s1",
            &[("offset".into(), "5".into()), ("live".into(), "long-poll".into())],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonicalize_without_query() {
        assert_eq!(canonicalize_url("/v1/read/s1", &[]), "/v1/read/s1");
    }
}
