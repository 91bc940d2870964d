//! Store/never-store decision tree (`I4`/`I5`).

use crate::core::constants::{CACHE_MAX_AGE_LONG_POLL_SECS, CACHE_MAX_AGE_PLAIN_SECS, CACHE_STALE_WHILE_REVALIDATE_SECS};

/// Everything the store decision needs to know about a request/response pair.
#[derive(Debug, Clone, Default)]
pub struct OriginExchange {
    pub method: String,
    pub status: u16,
    pub origin_cache_control: Option<String>,
    pub debug_coalesce: bool,
    pub content_type: Option<String>,
    pub offset_is_now: bool,
    pub is_long_poll: bool,
    pub stream_up_to_date: bool,
    pub ttl_remaining_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreDecision {
    Store { cache_control: String },
    NoStore,
}

/// Decide whether an origin response may be cached, and if so with what
/// `Cache-Control` header. Mirrors `I4` (never-store) then `I5` (store).
pub fn store_decision(exchange: &OriginExchange) -> StoreDecision {
    if !exchange.method.eq_ignore_ascii_case("GET") {
        return StoreDecision::NoStore;
    }
    if exchange.status >= 400 {
        return StoreDecision::NoStore;
    }
    if exchange
        .origin_cache_control
        .as_deref()
        .is_some_and(|cc| cc.contains("no-store"))
    {
        return StoreDecision::NoStore;
    }
    if exchange.debug_coalesce {
        return StoreDecision::NoStore;
    }
    if exchange.content_type.as_deref() == Some("text/event-stream") {
        return StoreDecision::NoStore;
    }
    if exchange.offset_is_now {
        return StoreDecision::NoStore;
    }
    if exchange.is_long_poll && exchange.status == 204 {
        return StoreDecision::NoStore;
    }

    if exchange.is_long_poll && exchange.status == 200 {
        let max_age = clamp_ttl(CACHE_MAX_AGE_LONG_POLL_SECS, exchange.ttl_remaining_secs);
        return StoreDecision::Store {
            cache_control: format!("public, max-age={}", max_age),
        };
    }

    if exchange.stream_up_to_date {
        return StoreDecision::NoStore;
    }

    let max_age = clamp_ttl(CACHE_MAX_AGE_PLAIN_SECS, exchange.ttl_remaining_secs);
    StoreDecision::Store {
        cache_control: format!(
            "public, max-age={}, stale-while-revalidate={}",
            max_age, CACHE_STALE_WHILE_REVALIDATE_SECS
        ),
    }
}

fn clamp_ttl(declared: u64, remaining: Option<u64>) -> u64 {
    match remaining {
        Some(remaining) => declared.min(remaining),
        None => declared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> OriginExchange {
        OriginExchange {
            method: "GET".into(),
            status: 200,
            ..Default::default()
        }
    }

    #[test]
    fn test_head_never_stores() {
        let mut exchange = base();
        exchange.method = "HEAD".into();
        assert_eq!(store_decision(&exchange), StoreDecision::NoStore);
    }

    #[test]
    fn test_error_status_never_stores() {
        let mut exchange = base();
        exchange.status = 503;
        assert_eq!(store_decision(&exchange), StoreDecision::NoStore);
    }

    #[test]
    fn test_debug_coalesce_never_stores() {
        let mut exchange = base();
        exchange.debug_coalesce = true;
        assert_eq!(store_decision(&exchange), StoreDecision::NoStore);
    }

    #[test]
    fn test_sse_never_stores() {
        let mut exchange = base();
        exchange.content_type = Some("text/event-stream".into());
        assert_eq!(store_decision(&exchange), StoreDecision::NoStore);
    }

    #[test]
    fn test_offset_now_never_stores() {
        let mut exchange = base();
        exchange.offset_is_now = true;
        assert_eq!(store_decision(&exchange), StoreDecision::NoStore);
    }

    #[test]
    fn test_long_poll_204_never_stores() {
        let mut exchange = base();
        exchange.is_long_poll = true;
        exchange.status = 204;
        assert_eq!(store_decision(&exchange), StoreDecision::NoStore);
    }

    #[test]
    fn test_long_poll_200_stores_with_20s_max_age() {
        let mut exchange = base();
        exchange.is_long_poll = true;
        assert_eq!(
            store_decision(&exchange),
            StoreDecision::Store { cache_control: "public, max-age=20".into() }
        );
    }

    #[test]
    fn test_plain_get_up_to_date_never_stores() {
        let mut exchange = base();
        exchange.stream_up_to_date = true;
        assert_eq!(store_decision(&exchange), StoreDecision::NoStore);
    }

    #[test]
    fn test_plain_get_stores_with_60s_swr_300() {
        let exchange = base();
        assert_eq!(
            store_decision(&exchange),
            StoreDecision::Store {
                cache_control: "public, max-age=60, stale-while-revalidate=300".into()
            }
        );
    }

    #[test]
    fn test_max_age_clamped_to_remaining_ttl() {
        let mut exchange = base();
        exchange.ttl_remaining_secs = Some(10);
        assert_eq!(
            store_decision(&exchange),
            StoreDecision::Store {
                cache_control: "public, max-age=10, stale-while-revalidate=300".into()
            }
        );
    }
}
