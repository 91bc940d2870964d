//! C4 — fan-out engine: bounded-parallelism inline delivery.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::core::constants::INLINE_FANOUT_PARALLELISM;
use crate::log_client::{LogClient, RequestExtras, session_do_key};

use super::queue::ProducerTriple;

/// Outcome of an inline fan-out round.
#[derive(Debug, Default)]
pub struct FanoutOutcome {
    pub successes: u64,
    pub failures: u64,
    pub stale_session_ids: Vec<String>,
}

pub struct FanoutEngine {
    log_client: Arc<LogClient>,
}

impl FanoutEngine {
    pub fn new(log_client: Arc<LogClient>) -> Self {
        Self { log_client }
    }

    /// Deliver the payload to every subscriber directly, bounded to
    /// `INLINE_FANOUT_PARALLELISM` concurrent requests, waiting for all of
    /// them to settle before returning.
    pub async fn fanout_inline(
        &self,
        project: &str,
        subscribers: &[String],
        payload: &[u8],
        content_type: &str,
        producer: &ProducerTriple,
    ) -> FanoutOutcome {
        let mut outcome = FanoutOutcome::default();
        let mut in_flight = FuturesUnordered::new();
        let mut remaining = subscribers.iter();

        for session_id in remaining.by_ref().take(INLINE_FANOUT_PARALLELISM) {
            in_flight.push(self.deliver_one(project, session_id, payload, content_type, producer));
        }

        while let Some((session_id, result)) = in_flight.next().await {
            match result {
                DeliveryResult::Success => outcome.successes += 1,
                DeliveryResult::Stale => {
                    outcome.failures += 1;
                    outcome.stale_session_ids.push(session_id);
                }
                DeliveryResult::Failure => outcome.failures += 1,
            }

            if let Some(session_id) = remaining.next() {
                in_flight.push(self.deliver_one(project, session_id, payload, content_type, producer));
            }
        }

        outcome
    }

    async fn deliver_one(
        &self,
        project: &str,
        session_id: &str,
        payload: &[u8],
        content_type: &str,
        producer: &ProducerTriple,
    ) -> (String, DeliveryResult) {
        let do_key = session_do_key(project, session_id);
        let extras = RequestExtras::default()
            .with_header("Content-Type", content_type.to_string())
            .with_header("Producer-Id", producer.id.clone())
            .with_header("Producer-Epoch", producer.epoch.clone())
            .with_header("Producer-Seq", producer.seq.to_string());

        let result = match self.log_client.post_stream(&do_key, payload.to_vec(), extras).await {
            Ok(resp) if resp.is_success() => DeliveryResult::Success,
            Ok(resp) if resp.is_not_found() => DeliveryResult::Stale,
            Ok(_) => {
                tracing::warn!(
                    error = %crate::error::FabricError::FanoutSubscriber,
                    session_id,
                    "inline fan-out delivery rejected by subscriber stream"
                );
                DeliveryResult::Failure
            }
            Err(e) => {
                tracing::warn!(error = %e, session_id, "inline fan-out delivery failed");
                DeliveryResult::Failure
            }
        };

        (session_id.to_string(), result)
    }
}

enum DeliveryResult {
    Success,
    Stale,
    Failure,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LogServiceConfig;

    fn engine() -> FanoutEngine {
        FanoutEngine::new(Arc::new(
            LogClient::new(&LogServiceConfig {
                base_url: "http://localhost:1".into(),
                auth_token: None,
            })
            .unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_fanout_inline_empty_subscribers() {
        let engine = engine();
        let producer = ProducerTriple::for_fanout("s", 1);
        let outcome = engine
            .fanout_inline("proj", &[], b"hello", "application/json", &producer)
            .await;
        assert_eq!(outcome.successes, 0);
        assert_eq!(outcome.failures, 0);
    }

    #[tokio::test]
    async fn test_fanout_inline_counts_connection_failures() {
        let engine = engine();
        let producer = ProducerTriple::for_fanout("s", 1);
        let subscribers = vec!["a".to_string(), "b".to_string()];
        let outcome = engine
            .fanout_inline("proj", &subscribers, b"hello", "application/json", &producer)
            .await;
        assert_eq!(outcome.successes + outcome.failures, 2);
    }
}
