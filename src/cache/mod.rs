//! C8 — edge read cache with request coalescing.

pub mod entry;
pub mod inflight;
pub mod key;
pub mod policy;

pub use entry::CachedResponse;
pub use inflight::InFlightRegistry;
pub use key::cache_key;
pub use policy::{store_decision, StoreDecision};

use std::sync::Arc;

use crate::core::constants::COALESCE_LINGER_MS;

/// Outcome of a cache lookup, mirrored to the `X-Cache` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_header_value(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

pub struct EdgeCache {
    store: moka::future::Cache<String, CachedResponse>,
    in_flight: Arc<InFlightRegistry>,
}

impl EdgeCache {
    pub fn new() -> Self {
        Self {
            store: moka::future::Cache::builder()
                .max_capacity(50_000)
                .build(),
            in_flight: Arc::new(InFlightRegistry::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        self.store.get(key).await
    }

    pub async fn store(&self, key: String, response: CachedResponse) {
        self.store.insert(key, response).await;
    }

    /// Coalesce concurrent origin fetches for the same key (`I5`'s in-flight
    /// registry). `fetch` runs only for the first caller; concurrent callers
    /// await its result. `fetch` returns the response to hand back to the
    /// caller alongside the response to persist in the store, if any — the
    /// store decision is the caller's (it already knows `StoreDecision`), so
    /// the in-flight linger can be keyed to "was actually stored" rather
    /// than "the fetch didn't error" (spec.md's state machine: a 404, an
    /// at-tail 200, or a long-poll 204 is a successful fetch that's still
    /// never stored).
    ///
    /// Returns `(response, performed_own_fetch)` — `performed_own_fetch` is
    /// `true` for the caller that actually hit the origin (leader, or a
    /// straggler that fell through after a rejection), `false` for a
    /// follower that rode the leader's in-flight result.
    pub async fn get_or_coalesce<F, Fut>(
        &self,
        key: &str,
        fetch: F,
    ) -> Result<(CachedResponse, bool), crate::error::FabricError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(CachedResponse, Option<CachedResponse>), crate::error::FabricError>>,
    {
        if let Some((wait, is_leader)) = self.in_flight.register_or_join(key) {
            if is_leader {
                let result = fetch().await;
                match result {
                    Ok((resp, to_store)) => {
                        let should_linger = to_store.is_some();
                        if let Some(stored) = to_store {
                            self.store(key.to_string(), stored).await;
                        }
                        self.in_flight.resolve(key, Ok(resp.clone()), should_linger, COALESCE_LINGER_MS);
                        return Ok((resp, true));
                    }
                    Err(e) => {
                        self.in_flight.resolve(key, Err(()), false, COALESCE_LINGER_MS);
                        return Err(e);
                    }
                }
            }
            match wait.await {
                Ok(resp) => return Ok((resp, false)),
                // Leader's fetch failed or wasn't storable — fall through
                // to our own origin request rather than propagating.
                Err(()) => {
                    tracing::debug!(
                        error = %crate::error::FabricError::CacheCoalesce,
                        key,
                        "coalesced origin fetch unavailable, fetching directly"
                    );
                    return self.fetch_and_store(key, fetch).await;
                }
            }
        }
        self.fetch_and_store(key, fetch).await
    }

    async fn fetch_and_store<F, Fut>(
        &self,
        key: &str,
        fetch: F,
    ) -> Result<(CachedResponse, bool), crate::error::FabricError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(CachedResponse, Option<CachedResponse>), crate::error::FabricError>>,
    {
        let (resp, to_store) = fetch().await?;
        if let Some(stored) = to_store {
            self.store(key.to_string(), stored).await;
        }
        Ok((resp, true))
    }
}

impl Default for EdgeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn sample_response() -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: b"hello".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_store_and_get_roundtrip() {
        let cache = EdgeCache::new();
        cache.store("GET /v1/read/s1".into(), sample_response()).await;
        let hit = cache.get("GET /v1/read/s1").await;
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().body, b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_coalesce_runs_origin_fetch_once() {
        let cache = Arc::new(EdgeCache::new());
        let calls = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_coalesce("GET /v1/read/s1?offset=5", || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                            let resp = CachedResponse {
                                status: 200,
                                headers: vec![],
                                body: b"B".to_vec(),
                            };
                            Ok((resp.clone(), Some(resp)))
                        }
                    })
                    .await
            }));
        }

        let mut leader_count = 0;
        for handle in handles {
            let (result, performed_own_fetch) = handle.await.unwrap().unwrap();
            assert_eq!(result.body, b"B".to_vec());
            if performed_own_fetch {
                leader_count += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(leader_count, 1);
    }

    #[tokio::test]
    async fn test_unstorable_fetch_does_not_linger() {
        let cache = EdgeCache::new();
        let (resp, performed_own_fetch) = cache
            .get_or_coalesce("GET /v1/read/s1?offset=now", || async {
                Ok((
                    CachedResponse {
                        status: 200,
                        headers: vec![],
                        body: b"tail".to_vec(),
                    },
                    None,
                ))
            })
            .await
            .unwrap();
        assert!(performed_own_fetch);
        assert_eq!(resp.body, b"tail".to_vec());
        assert!(cache.get("GET /v1/read/s1?offset=now").await.is_none());
    }
}
