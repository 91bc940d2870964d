//! In-flight request registry backing origin-fetch coalescing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;

use super::entry::CachedResponse;
use crate::core::constants::MAX_IN_FLIGHT;

/// `None` while the leader's fetch is still running, `Some(..)` once
/// resolved — a `watch` channel so a joiner arriving after resolution reads
/// the buffered value straight off `borrow()` instead of missing it the way
/// a `broadcast::Receiver` subscribed after the send would.
type Slot = Arc<watch::Sender<Option<Result<CachedResponse, ()>>>>;
type Waiter = Pin<Box<dyn Future<Output = Result<CachedResponse, ()>> + Send>>;

pub struct InFlightRegistry {
    slots: DashMap<String, Slot>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Atomically register this key as in-flight if no one else has, or
    /// join an existing in-flight fetch. Returns `None` if the registry is
    /// saturated (`MAX_IN_FLIGHT`), in which case the caller should just
    /// fetch directly without coalescing.
    pub fn register_or_join(&self, key: &str) -> Option<(Waiter, bool)> {
        if let Some(slot) = self.slots.get(key) {
            let tx = slot.clone();
            return Some((Box::pin(Self::wait_for(tx)), false));
        }

        if self.slots.len() >= MAX_IN_FLIGHT {
            return None;
        }

        let (tx, _rx) = watch::channel(None);
        let tx = Arc::new(tx);
        self.slots.insert(key.to_string(), tx.clone());
        Some((Box::pin(Self::wait_for(tx)), true))
    }

    /// Wait for the slot to resolve. If it already has (the watch value was
    /// set before we subscribed), returns immediately; otherwise waits on
    /// the next change. Resolves to `Err(())` if the leader's slot is
    /// dropped without ever resolving.
    async fn wait_for(tx: Slot) -> Result<CachedResponse, ()> {
        let mut rx = tx.subscribe();
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(());
            }
        }
    }

    /// Publish the fetch's outcome to every waiter, then either linger
    /// (the response was actually stored, so callers arriving right after
    /// resolution still get a fast path) or clear the slot immediately (not
    /// stored, or failed — waiters must fall through to their own fetch).
    /// The delayed removal only drops the map entry if it's still the exact
    /// slot this call resolved — a later cycle for the same key during the
    /// linger window is left untouched (spec's replace-guard).
    pub fn resolve(
        self: &Arc<Self>,
        key: &str,
        result: Result<CachedResponse, ()>,
        should_linger: bool,
        linger_ms: u64,
    ) {
        let tx = match self.slots.get(key) {
            Some(slot) => slot.clone(),
            None => return,
        };
        // `send` is a no-op when no receiver has subscribed yet (the leader
        // itself never subscribes), so use `send_replace` to update the
        // value unconditionally.
        tx.send_replace(Some(result));

        let registry = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if should_linger {
                tokio::time::sleep(Duration::from_millis(linger_ms)).await;
            }
            registry.slots.remove_if(&key, |_, existing| Arc::ptr_eq(existing, &tx));
        });
    }
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_first_caller_is_leader() {
        let registry = InFlightRegistry::new();
        let (_, is_leader) = registry.register_or_join("k1").unwrap();
        assert!(is_leader);
    }

    #[test]
    fn test_register_second_caller_joins() {
        let registry = InFlightRegistry::new();
        let _first = registry.register_or_join("k1").unwrap();
        let (_, is_leader) = registry.register_or_join("k1").unwrap();
        assert!(!is_leader);
    }

    #[tokio::test]
    async fn test_joiner_after_resolve_still_observes_value() {
        let registry = Arc::new(InFlightRegistry::new());
        let (_leader_wait, _) = registry.register_or_join("k1").unwrap();

        let resolved = CachedResponse {
            status: 200,
            headers: vec![],
            body: b"value".to_vec(),
        };
        registry.resolve("k1", Ok(resolved.clone()), true, 200);

        // Joins after the leader already sent — must not block on a
        // broadcast subscription that missed the value.
        let (wait, is_leader) = registry.register_or_join("k1").unwrap();
        assert!(!is_leader);
        let result = tokio::time::timeout(Duration::from_millis(50), wait)
            .await
            .expect("joiner should not need to wait for the linger window")
            .expect("should observe the resolved value");
        assert_eq!(result.body, b"value".to_vec());
    }

    #[tokio::test]
    async fn test_no_linger_removes_slot_immediately() {
        let registry = Arc::new(InFlightRegistry::new());
        let (_wait, _) = registry.register_or_join("k1").unwrap();
        registry.resolve("k1", Err(()), false, 10_000);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!registry.slots.contains_key("k1"));
    }

    #[tokio::test]
    async fn test_replace_guard_does_not_remove_newer_slot() {
        let registry = Arc::new(InFlightRegistry::new());
        let (_wait, _) = registry.register_or_join("k1").unwrap();
        registry.resolve("k1", Ok(CachedResponse { status: 200, headers: vec![], body: vec![] }), true, 10);

        // Let the first cycle's slot be replaced by a new cycle before the
        // first's delayed removal fires.
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.slots.remove("k1");
        let (_wait2, is_leader2) = registry.register_or_join("k1").unwrap();
        assert!(is_leader2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.slots.contains_key("k1"));
    }
}
