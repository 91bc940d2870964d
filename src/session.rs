//! C5 — session controller. The log itself is the authoritative store for
//! session existence; there is no separate session table.

use std::sync::Arc;

use serde::Serialize;

use crate::error::FabricError;
use crate::expiry::ExpiryOracle;
use crate::log_client::{LogClient, RequestExtras, session_do_key};
use crate::metrics::MetricsSink;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub stream_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub session_stream_path: String,
    pub subscriptions: Vec<SubscriptionSummary>,
}

pub struct SessionController {
    log_client: Arc<LogClient>,
    oracle: Arc<ExpiryOracle>,
    metrics: Arc<MetricsSink>,
    ttl_seconds: u64,
}

impl SessionController {
    pub fn new(
        log_client: Arc<LogClient>,
        oracle: Arc<ExpiryOracle>,
        metrics: Arc<MetricsSink>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            log_client,
            oracle,
            metrics,
            ttl_seconds,
        }
    }

    /// Create or refresh a session's expiry. 2xx and 409 (already-open with
    /// a concurrent writer) both count as success.
    pub async fn touch_session(
        &self,
        project: &str,
        session_id: &str,
    ) -> Result<(i64, bool), FabricError> {
        let do_key = session_do_key(project, session_id);
        let existed_before = self
            .log_client
            .head_stream(&do_key, RequestExtras::default())
            .await
            .map(|resp| resp.is_success())
            .unwrap_or(false);

        let expires_at = chrono::Utc::now().timestamp_millis() + (self.ttl_seconds as i64 * 1000);
        let extras =
            RequestExtras::default().with_header("Stream-Expires-At", expires_at.to_string());

        let resp = self.log_client.put_stream(&do_key, extras).await?;
        if resp.status.as_u16() == 409 {
            tracing::debug!(
                error = %FabricError::Conflict(do_key.clone()),
                "session stream already open, treating as success"
            );
        } else if !resp.is_success() {
            return Err(FabricError::OriginWrite {
                status: resp.status.as_u16(),
            });
        }

        if existed_before {
            self.metrics.emit_session_touch(project, session_id, self.ttl_seconds);
        } else {
            self.metrics.emit_session_create(project, session_id, self.ttl_seconds);
        }

        Ok((expires_at, !existed_before))
    }

    /// Look up a session, returning `None` on 404. Subscription listing is
    /// best-effort and degrades to an empty list on analytics failure.
    pub async fn get_session(
        &self,
        project: &str,
        session_id: &str,
    ) -> Result<Option<SessionInfo>, FabricError> {
        let do_key = session_do_key(project, session_id);
        let resp = self
            .log_client
            .head_stream(&do_key, RequestExtras::default())
            .await?;

        if resp.is_not_found() {
            return Ok(None);
        }

        let subscriptions = self
            .oracle
            .session_streams(project, session_id)
            .await
            .into_iter()
            .map(|stream_id| SubscriptionSummary { stream_id })
            .collect();

        Ok(Some(SessionInfo {
            session_id: session_id.to_string(),
            session_stream_path: do_key,
            subscriptions,
        }))
    }

    /// Delete a session's stream. 404 is treated as success (idempotent).
    pub async fn delete_session(&self, project: &str, session_id: &str) -> Result<(), FabricError> {
        let do_key = session_do_key(project, session_id);
        let resp = self
            .log_client
            .delete_stream(&do_key, RequestExtras::default())
            .await?;

        if resp.is_success() || resp.is_not_found() {
            self.metrics.emit_session_delete(project, session_id);
            Ok(())
        } else {
            Err(FabricError::OriginWrite {
                status: resp.status.as_u16(),
            })
        }
    }
}
