//! C7 — cleanup sweeper: scheduled removal of expired sessions.
//!
//! Runs as a background tick. Marks a session expired, gives it a grace
//! window (`I7`) in case a touch races the sweep, then deletes its stream
//! and drops its subscriptions.

use std::sync::Arc;

use crate::core::constants::{CLEANUP_BATCH_SIZE, CLEANUP_GRACE_SECS};
use crate::expiry::ExpiryOracle;
use crate::log_client::{LogClient, RequestExtras, session_do_key};
use crate::metrics::MetricsSink;
use crate::subscription::SubscriptionRegistry;

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupOutcome {
    pub deleted: u64,
    pub stream_delete_successes: u64,
    pub stream_delete_failures: u64,
    pub subscription_remove_successes: u64,
    pub subscription_remove_failures: u64,
}

pub struct CleanupSweeper {
    oracle: Arc<ExpiryOracle>,
    registry: Arc<SubscriptionRegistry>,
    log_client: Arc<LogClient>,
    metrics: Arc<MetricsSink>,
}

impl CleanupSweeper {
    pub fn new(
        oracle: Arc<ExpiryOracle>,
        registry: Arc<SubscriptionRegistry>,
        log_client: Arc<LogClient>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            oracle,
            registry,
            log_client,
            metrics,
        }
    }

    pub async fn sweep(&self) -> CleanupOutcome {
        if !self.oracle.has_credentials() {
            tracing::debug!("cleanup sweep skipped, no analytics credentials configured");
            return CleanupOutcome::default();
        }

        let expired = self.oracle.expired_sessions().await;
        if expired.is_empty() {
            return CleanupOutcome::default();
        }

        let mut outcome = CleanupOutcome::default();
        for batch in expired.chunks(CLEANUP_BATCH_SIZE) {
            self.metrics.emit_cleanup_batch(batch.len() as u64);
            let results = futures::future::join_all(
                batch.iter().map(|session| self.process_one(session)),
            )
            .await;

            for result in results {
                outcome.stream_delete_successes += result.stream_delete_successes;
                outcome.stream_delete_failures += result.stream_delete_failures;
                outcome.subscription_remove_successes += result.subscription_remove_successes;
                outcome.subscription_remove_failures += result.subscription_remove_failures;
                outcome.deleted += result.deleted;
            }
        }

        outcome
    }

    async fn process_one(&self, session: &crate::expiry::ExpiredSession) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();
        let mark_time = session.last_activity;

        self.metrics.emit_session_expire(&session.project, &session.session_id);
        tracing::debug!(
            session_id = %session.session_id,
            ttl_seconds = session.ttl_seconds,
            mark_time,
            "cleanup processing expired session"
        );

        let streams = self
            .oracle
            .session_streams(&session.project, &session.session_id)
            .await;

        for stream_id in &streams {
            let actor = self.registry.get_or_create(&session.project, stream_id);
            match actor.remove_subscriber(&session.session_id).await {
                Ok(()) => outcome.subscription_remove_successes += 1,
                Err(e) => {
                    tracing::warn!(error = %e, stream_id, "cleanup failed to remove subscriber");
                    outcome.subscription_remove_failures += 1;
                }
            }
        }

        if let Some(latest) = self.oracle.last_activity(&session.project, &session.session_id).await {
            let grace_ms = CLEANUP_GRACE_SECS * 1000;
            if latest > mark_time + grace_ms {
                tracing::debug!(
                    session_id = %session.session_id,
                    "session activity advanced past grace window, skipping delete"
                );
                return outcome;
            }
        }

        let do_key = session_do_key(&session.project, &session.session_id);
        match self
            .log_client
            .delete_stream(&do_key, RequestExtras::default())
            .await
        {
            Ok(resp) if resp.is_success() || resp.is_not_found() => {
                outcome.stream_delete_successes += 1;
                outcome.deleted += 1;
                self.metrics.emit_session_delete(&session.project, &session.session_id);
            }
            Ok(_) => outcome.stream_delete_failures += 1,
            Err(e) => {
                tracing::warn!(error = %e, session_id = %session.session_id, "cleanup failed to delete session stream");
                outcome.stream_delete_failures += 1;
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AnalyticsConfig, LogServiceConfig};

    fn sweeper() -> CleanupSweeper {
        let log_client = Arc::new(
            LogClient::new(&LogServiceConfig {
                base_url: "http://localhost:1".into(),
                auth_token: None,
            })
            .unwrap(),
        );
        let oracle = Arc::new(ExpiryOracle::new(AnalyticsConfig {
            account_id: None,
            api_token: None,
            dataset: "streamfabric".into(),
        }));
        let fanout_engine = Arc::new(crate::fanout::FanoutEngine::new(log_client.clone()));
        let metrics = Arc::new(MetricsSink::new(AnalyticsConfig {
            account_id: None,
            api_token: None,
            dataset: "streamfabric".into(),
        }));
        let deps = Arc::new(crate::subscription::actor::ActorDeps::new(
            log_client.clone(),
            fanout_engine,
            None,
            metrics.clone(),
        ));
        let registry = Arc::new(SubscriptionRegistry::new(
            sqlx::SqlitePool::connect_lazy("sqlite::memory:").unwrap(),
            deps,
        ));
        CleanupSweeper::new(oracle, registry, log_client, metrics)
    }

    #[tokio::test]
    async fn test_sweep_without_credentials_is_a_noop() {
        let sweeper = sweeper();
        let outcome = sweeper.sweep().await;
        assert_eq!(outcome.deleted, 0);
        assert_eq!(outcome.stream_delete_successes, 0);
    }
}
