//! The subscription actor (C3): single writer per `(project, streamId)`,
//! owning that stream's subscriber set and its publish algorithm.

use std::sync::{Arc, OnceLock};

use sqlx::SqlitePool;
use tokio::sync::Mutex as AsyncMutex;

use crate::core::constants::{DEFAULT_FANOUT_QUEUE_THRESHOLD, SESSION_STREAM_PREFIX};
use crate::error::FabricError;
use crate::fanout::{FanoutEngine, FanoutMessage, FanoutQueue, ProducerTriple};
use crate::log_client::{LogClient, RequestExtras, do_key};
use crate::metrics::MetricsSink;

/// Subscriber dependencies shared by every actor the registry constructs.
///
/// `fanout_queue` is a `OnceLock` rather than a plain field because the
/// queue consumer needs a handle to the very registry it will later be
/// wired into — it is set once, after the consumer task has been spawned,
/// without requiring a second registry instance.
pub struct ActorDeps {
    pub log_client: Arc<LogClient>,
    pub fanout_engine: Arc<FanoutEngine>,
    pub fanout_queue: OnceLock<Arc<FanoutQueue>>,
    pub metrics: Arc<MetricsSink>,
    pub fanout_queue_threshold: usize,
}

impl ActorDeps {
    pub fn new(
        log_client: Arc<LogClient>,
        fanout_engine: Arc<FanoutEngine>,
        fanout_queue: Option<Arc<FanoutQueue>>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        let cell = OnceLock::new();
        if let Some(queue) = fanout_queue {
            let _ = cell.set(queue);
        }
        Self {
            log_client,
            fanout_engine,
            fanout_queue: cell,
            metrics,
            fanout_queue_threshold: DEFAULT_FANOUT_QUEUE_THRESHOLD,
        }
    }

    pub fn with_queue_threshold(mut self, threshold: usize) -> Self {
        self.fanout_queue_threshold = threshold;
        self
    }

    /// Wire in the fan-out queue after construction. No-op if already set.
    pub fn set_fanout_queue(&self, queue: Arc<FanoutQueue>) {
        let _ = self.fanout_queue.set(queue);
    }
}

/// Result of a publish call, mirrored back to the HTTP layer as `X-Fanout-*`
/// response headers.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub next_offset: Option<u64>,
    pub fanout_count: u64,
    pub fanout_successes: u64,
    pub fanout_failures: u64,
    pub fanout_mode: &'static str,
}

pub struct SubscriptionActor {
    project: String,
    stream_id: String,
    pool: SqlitePool,
    write_lock: AsyncMutex<()>,
    deps: Arc<ActorDeps>,
}

impl SubscriptionActor {
    pub fn new(project: String, stream_id: String, pool: SqlitePool, deps: Arc<ActorDeps>) -> Self {
        Self {
            project,
            stream_id,
            pool,
            write_lock: AsyncMutex::new(()),
            deps,
        }
    }

    /// Idempotent insert; re-adding an already-subscribed session does not
    /// refresh `subscribedAt`.
    pub async fn add_subscriber(&self, session_id: &str) -> Result<(), FabricError> {
        let _guard = self.write_lock.lock().await;
        let subscribed_at = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT OR IGNORE INTO subscribers (project, stream_id, session_id, subscribed_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&self.project)
        .bind(&self.stream_id)
        .bind(session_id)
        .bind(subscribed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_subscriber(&self, session_id: &str) -> Result<(), FabricError> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "DELETE FROM subscribers WHERE project = ? AND stream_id = ? AND session_id = ?",
        )
        .bind(&self.project)
        .bind(&self.stream_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_subscribers(&self, session_ids: &[String]) -> Result<(), FabricError> {
        if session_ids.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        for session_id in session_ids {
            sqlx::query(
                "DELETE FROM subscribers WHERE project = ? AND stream_id = ? AND session_id = ?",
            )
            .bind(&self.project)
            .bind(&self.stream_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_subscribers(&self) -> Result<Vec<String>, FabricError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT session_id FROM subscribers WHERE project = ? AND stream_id = ? ORDER BY subscribed_at",
        )
        .bind(&self.project)
        .bind(&self.stream_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    /// The full publish algorithm: source write, subscriber fan-out, stale
    /// eviction, metrics emission.
    pub async fn publish(
        &self,
        payload: Vec<u8>,
        content_type: String,
        producer_id: Option<String>,
        producer_epoch: Option<String>,
        producer_seq: Option<u64>,
    ) -> Result<PublishOutcome, FabricError> {
        let source_key = do_key(&self.project, &self.stream_id);
        let mut extras = RequestExtras::default().with_header("Content-Type", content_type.clone());
        if let Some(id) = &producer_id {
            extras = extras.with_header("Producer-Id", id.clone());
        }
        if let Some(epoch) = &producer_epoch {
            extras = extras.with_header("Producer-Epoch", epoch.clone());
        }
        if let Some(seq) = producer_seq {
            extras = extras.with_header("Producer-Seq", seq.to_string());
        }

        let source_resp = self
            .deps
            .log_client
            .post_stream(&source_key, payload.clone(), extras)
            .await;

        let source_resp = match source_resp {
            Ok(resp) if resp.is_success() => resp,
            Ok(resp) => {
                self.deps.metrics.emit_publish_error(&self.project, &self.stream_id);
                return Ok(PublishOutcome {
                    status: resp.status.as_u16(),
                    body: b"Failed to write to stream".to_vec(),
                    content_type: None,
                    next_offset: None,
                    fanout_count: 0,
                    fanout_successes: 0,
                    fanout_failures: 0,
                    fanout_mode: "inline",
                });
            }
            Err(e) => {
                self.deps.metrics.emit_publish_error(&self.project, &self.stream_id);
                return Err(e);
            }
        };

        let next_offset: Option<u64> = source_resp
            .header("Stream-Next-Offset")
            .and_then(|v| v.parse().ok());

        let producer = ProducerTriple::for_fanout(&self.stream_id, next_offset.unwrap_or(0));
        let subscribers = self.get_subscribers().await?;
        let fanout_count = subscribers.len() as u64;

        let threshold = self.deps.fanout_queue_threshold;
        let has_queue = self.deps.fanout_queue.get().is_some();

        let (successes, failures, stale, mode) =
            if subscribers.len() > threshold && has_queue {
                match self.enqueue_fanout(&subscribers, &payload, &content_type, &producer) {
                    Ok(()) => (subscribers.len() as u64, 0, Vec::new(), "queued"),
                    Err(e) => {
                        tracing::warn!(error = %e, stream_id = %self.stream_id, "queue enqueue failed, falling back to inline fan-out");
                        let outcome = self
                            .deps
                            .fanout_engine
                            .fanout_inline(&self.project, &subscribers, &payload, &content_type, &producer)
                            .await;
                        (outcome.successes, outcome.failures, outcome.stale_session_ids, "inline")
                    }
                }
            } else {
                let outcome = self
                    .deps
                    .fanout_engine
                    .fanout_inline(&self.project, &subscribers, &payload, &content_type, &producer)
                    .await;
                (outcome.successes, outcome.failures, outcome.stale_session_ids, "inline")
            };

        if !stale.is_empty() {
            self.remove_subscribers(&stale).await?;
        }

        self.deps.metrics.emit_publish(&self.project, &self.stream_id);
        self.deps.metrics.emit_fanout(&self.project, &self.stream_id, fanout_count, mode);

        let content_type = source_resp.header("Content-Type").map(|s| s.to_string());
        Ok(PublishOutcome {
            status: source_resp.status.as_u16(),
            body: source_resp.body,
            content_type,
            next_offset,
            fanout_count,
            fanout_successes: successes,
            fanout_failures: failures,
            fanout_mode: mode,
        })
    }

    fn enqueue_fanout(
        &self,
        subscribers: &[String],
        payload: &[u8],
        content_type: &str,
        producer: &ProducerTriple,
    ) -> Result<(), FabricError> {
        let queue = self.deps.fanout_queue.get().expect("checked by caller");
        let messages = subscribers
            .iter()
            .map(|session_id| FanoutMessage {
                project: self.project.clone(),
                session_id: session_id.clone(),
                source_stream_id: self.stream_id.clone(),
                do_key: format!("{}/{}{}", self.project, SESSION_STREAM_PREFIX, session_id),
                payload: payload.to_vec(),
                content_type: content_type.to_string(),
                producer: producer.clone(),
            })
            .collect();
        queue.send_batches(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LogServiceConfig;
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
            Arc::new(MetricsSink::new(crate::core::config::AnalyticsConfig {
                account_id: None,
                api_token: None,
                dataset: "streamfabric".into(),
            })),
        ))
    }

    #[tokio::test]
    async fn test_add_subscriber_is_idempotent() {
        let pool = test_pool().await;
        let actor = SubscriptionActor::new("proj".into(), "s1".into(), pool, test_deps());

        actor.add_subscriber("a").await.unwrap();
        actor.add_subscriber("a").await.unwrap();

        let subs = actor.get_subscribers().await.unwrap();
        assert_eq!(subs, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_subscriber() {
        let pool = test_pool().await;
        let actor = SubscriptionActor::new("proj".into(), "s1".into(), pool, test_deps());

        actor.add_subscriber("a").await.unwrap();
        actor.add_subscriber("b").await.unwrap();
        actor.remove_subscriber("a").await.unwrap();

        let subs = actor.get_subscribers().await.unwrap();
        assert_eq!(subs, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_subscribers_batch() {
        let pool = test_pool().await;
        let actor = SubscriptionActor::new("proj".into(), "s1".into(), pool, test_deps());

        actor.add_subscriber("a").await.unwrap();
        actor.add_subscriber("b").await.unwrap();
        actor.add_subscriber("c").await.unwrap();
        actor
            .remove_subscribers(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        let subs = actor.get_subscribers().await.unwrap();
        assert_eq!(subs, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_publish_with_unreachable_origin_reports_failure_without_fanout() {
        let pool = test_pool().await;
        let actor = SubscriptionActor::new("proj".into(), "s1".into(), pool, test_deps());
        actor.add_subscriber("a").await.unwrap();

        let outcome = actor
            .publish(b"hello".to_vec(), "application/json".into(), None, None, None)
            .await;

        // Origin is unreachable (no server listening), so this either errors
        // or yields a failure response; either way fan-out must not occur.
        if let Ok(outcome) = outcome {
            assert_eq!(outcome.fanout_count, 0);
        }
    }
}
