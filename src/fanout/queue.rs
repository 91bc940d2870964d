//! C9 — queue consumer for queued fan-out delivery.
//!
//! Models the durable work queue as an in-process mpsc channel: `FanoutQueue`
//! is the producer handle (`sendBatch`), the consumer loop spawned by
//! `spawn_consumer` is the per-message ack/retry policy.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::constants::{
    FANOUT_QUEUE_BATCH_SIZE, FANOUT_QUEUE_MAX_BATCHES_PER_CALL, FANOUT_RETRY_DELAY_EXCEPTION_SECS,
    FANOUT_RETRY_DELAY_TRANSIENT_SECS,
};
use crate::error::FabricError;
use crate::log_client::{LogClient, RequestExtras};
use crate::metrics::MetricsSink;
use crate::subscription::SubscriptionRegistry;

/// Synthesized producer identity for a fan-out copy, per `I2`/`I3`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerTriple {
    pub id: String,
    pub epoch: String,
    pub seq: u64,
}

impl ProducerTriple {
    pub fn for_fanout(source_stream_id: &str, source_next_offset: u64) -> Self {
        Self {
            id: format!("fanout:{}", source_stream_id),
            epoch: "1".to_string(),
            seq: source_next_offset,
        }
    }
}

/// One subscriber's worth of queued fan-out work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutMessage {
    pub project: String,
    pub session_id: String,
    /// Source stream this fan-out originated from, so a 404 eviction can be
    /// routed back to the owning subscription actor.
    pub source_stream_id: String,
    pub do_key: String,
    pub payload: Vec<u8>,
    pub content_type: String,
    pub producer: ProducerTriple,
}

/// Producer-side handle to the fan-out queue.
#[derive(Clone)]
pub struct FanoutQueue {
    tx: mpsc::UnboundedSender<FanoutMessage>,
}

impl FanoutQueue {
    /// Enqueue messages, chunked as `sendBatch` calls of
    /// `FANOUT_QUEUE_BATCH_SIZE` each. Rejects oversized publishes rather
    /// than silently dropping messages, letting the caller fall back inline.
    pub fn send_batches(&self, messages: Vec<FanoutMessage>) -> Result<(), FabricError> {
        let batches = messages.len().div_ceil(FANOUT_QUEUE_BATCH_SIZE);
        if batches > FANOUT_QUEUE_MAX_BATCHES_PER_CALL {
            return Err(FabricError::QueueEnqueue(format!(
                "{} messages exceeds the {} sendBatch calls allowed per publish",
                messages.len(),
                FANOUT_QUEUE_MAX_BATCHES_PER_CALL
            )));
        }

        for message in messages {
            self.tx
                .send(message)
                .map_err(|e| FabricError::QueueEnqueue(e.to_string()))?;
        }
        Ok(())
    }
}

/// Spawn the consumer loop (C9) and return the producer-side handle plus its
/// task handle for shutdown registration.
pub fn spawn_consumer(
    log_client: Arc<LogClient>,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<MetricsSink>,
) -> (FanoutQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<FanoutMessage>();

    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let log_client = log_client.clone();
            let registry = registry.clone();
            let metrics = metrics.clone();
            tokio::spawn(process_message(message, log_client, registry, metrics));
        }
    });

    (FanoutQueue { tx }, handle)
}

/// Per-message ack/retry policy: 2xx or 404 acks, 5xx retries after a fixed
/// delay, an exception (transport failure) retries after a longer fixed
/// delay, any other 4xx acks (the message is permanently unprocessable).
async fn process_message(
    message: FanoutMessage,
    log_client: Arc<LogClient>,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<MetricsSink>,
) {
    loop {
        let extras = RequestExtras::default()
            .with_header("Content-Type", message.content_type.clone())
            .with_header("Producer-Id", message.producer.id.clone())
            .with_header("Producer-Epoch", message.producer.epoch.clone())
            .with_header("Producer-Seq", message.producer.seq.to_string());

        match log_client
            .post_stream(&message.do_key, message.payload.clone(), extras)
            .await
        {
            Ok(resp) if resp.is_success() => {
                return;
            }
            Ok(resp) if resp.is_not_found() => {
                let actor = registry.get_or_create(&message.project, &message.source_stream_id);
                let _ = actor.remove_subscriber(&message.session_id).await;
                metrics.emit_session_expire(&message.project, &message.session_id);
                return;
            }
            Ok(resp) if resp.status.is_client_error() => {
                tracing::warn!(
                    status = %resp.status,
                    session_id = %message.session_id,
                    "queued fan-out message permanently rejected, acking"
                );
                return;
            }
            Ok(resp) => {
                tracing::warn!(
                    status = %resp.status,
                    session_id = %message.session_id,
                    "queued fan-out message failed transiently, retrying"
                );
                tokio::time::sleep(Duration::from_secs(FANOUT_RETRY_DELAY_TRANSIENT_SECS)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, session_id = %message.session_id, "queued fan-out delivery errored, retrying");
                tokio::time::sleep(Duration::from_secs(FANOUT_RETRY_DELAY_EXCEPTION_SECS)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_triple_for_fanout() {
        let triple = ProducerTriple::for_fanout("stream1", 42);
        assert_eq!(triple.id, "fanout:stream1");
        assert_eq!(triple.epoch, "1");
        assert_eq!(triple.seq, 42);
    }

    #[test]
    fn test_send_batches_rejects_oversized_publish() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = FanoutQueue { tx };
        let messages = (0..(FANOUT_QUEUE_BATCH_SIZE * FANOUT_QUEUE_MAX_BATCHES_PER_CALL + 1))
            .map(|i| FanoutMessage {
                project: "proj".into(),
                session_id: format!("session-{i}"),
                source_stream_id: "s".into(),
                do_key: "proj/session:x".into(),
                payload: vec![],
                content_type: "application/json".into(),
                producer: ProducerTriple::for_fanout("s", 1),
            })
            .collect();
        assert!(queue.send_batches(messages).is_err());
    }

    #[test]
    fn test_send_batches_accepts_within_limit() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = FanoutQueue { tx };
        let messages = vec![FanoutMessage {
            project: "proj".into(),
            session_id: "session-1".into(),
            source_stream_id: "s".into(),
            do_key: "proj/session:x".into(),
            payload: vec![],
            content_type: "application/json".into(),
            producer: ProducerTriple::for_fanout("s", 1),
        }];
        assert!(queue.send_batches(messages).is_ok());
    }
}
