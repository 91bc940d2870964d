//! Registry enforcing `I1`: exactly one subscription actor per
//! `(project, streamId)`.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::SqlitePool;

use super::actor::{ActorDeps, SubscriptionActor};

pub struct SubscriptionRegistry {
    pool: SqlitePool,
    deps: Arc<ActorDeps>,
    actors: DashMap<(String, String), Arc<SubscriptionActor>>,
}

impl SubscriptionRegistry {
    pub fn new(pool: SqlitePool, deps: Arc<ActorDeps>) -> Self {
        Self {
            pool,
            deps,
            actors: DashMap::new(),
        }
    }

    /// Look up the actor for a stream, creating it if this is the first
    /// reference. `DashMap::entry` makes the check-then-insert atomic, so
    /// two concurrent callers can never construct two actors for the same key.
    pub fn get_or_create(&self, project: &str, stream_id: &str) -> Arc<SubscriptionActor> {
        self.actors
            .entry((project.to_string(), stream_id.to_string()))
            .or_insert_with(|| {
                Arc::new(SubscriptionActor::new(
                    project.to_string(),
                    stream_id.to_string(),
                    self.pool.clone(),
                    self.deps.clone(),
                ))
            })
            .clone()
    }

    pub fn get(&self, project: &str, stream_id: &str) -> Option<Arc<SubscriptionActor>> {
        self.actors
            .get(&(project.to_string(), stream_id.to_string()))
            .map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AnalyticsConfig, LogServiceConfig};
    use crate::fanout::FanoutEngine;
    use crate::log_client::LogClient;
    use crate::metrics::MetricsSink;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE subscribers (project TEXT, stream_id TEXT, session_id TEXT, subscribed_at INTEGER, \
             PRIMARY KEY (project, stream_id, session_id))",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn test_deps() -> Arc<ActorDeps> {
        let log_client = Arc::new(
            LogClient::new(&LogServiceConfig {
                base_url: "http://localhost:1".into(),
                auth_token: None,
            })
            .unwrap(),
        );
        let fanout_engine = Arc::new(FanoutEngine::new(log_client.clone()));
        Arc::new(ActorDeps::new(
            log_client,
            fanout_engine,
            None,
            Arc::new(MetricsSink::new(AnalyticsConfig {
                account_id: None,
                api_token: None,
                dataset: "streamfabric".into(),
            })),
        ))
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_actor_for_same_key() {
        let registry = SubscriptionRegistry::new(test_pool().await, test_deps());
        let a = registry.get_or_create("proj", "s1");
        let b = registry.get_or_create("proj", "s1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_get_or_create_returns_distinct_actors_for_distinct_keys() {
        let registry = SubscriptionRegistry::new(test_pool().await, test_deps());
        let a = registry.get_or_create("proj", "s1");
        let b = registry.get_or_create("proj", "s2");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_get_before_create_returns_none() {
        let registry = SubscriptionRegistry::new(test_pool().await, test_deps());
        assert!(registry.get("proj", "unseen").is_none());
    }
}
