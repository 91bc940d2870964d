//! C2 — metrics sink.
//!
//! Write-only from the perspective of the data path: emitting a data point
//! never blocks or fails a request. The expiry oracle (C6) reads this same
//! dataset back out through a separate query path.

use serde::Serialize;
use std::sync::Arc;

use crate::core::config::AnalyticsConfig;

/// One structured data point, shaped for the analytics dataset the oracle
/// later aggregates over.
#[derive(Debug, Clone, Serialize)]
pub struct DataPoint {
    pub category: &'static str,
    pub event: &'static str,
    pub timestamp: i64,
    pub session_id: Option<String>,
    pub stream_id: Option<String>,
    pub project: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub count: Option<u64>,
}

impl DataPoint {
    pub fn new(category: &'static str, event: &'static str, timestamp: i64) -> Self {
        Self {
            category,
            event,
            timestamp,
            session_id: None,
            stream_id: None,
            project: None,
            ttl_seconds: None,
            count: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// Credentials-gated sink. With no account/API token configured, every
/// emission degrades silently to a no-op debug log rather than an error —
/// metrics must never fail a request on the data path.
pub struct MetricsSink {
    http: reqwest::Client,
    config: Arc<AnalyticsConfig>,
}

impl MetricsSink {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.config.account_id.is_some() && self.config.api_token.is_some()
    }

    /// Fire-and-forget emission. Never returns an error to the caller;
    /// failures are logged and swallowed.
    pub fn emit(&self, point: DataPoint) {
        if !self.has_credentials() {
            tracing::debug!(event = point.event, "metrics sink has no credentials, dropping data point");
            return;
        }

        let http = self.http.clone();
        let account_id = self.config.account_id.clone().unwrap();
        let api_token = self.config.api_token.clone().unwrap();
        let dataset = self.config.dataset.clone();

        tokio::spawn(async move {
            let url = format!(
                "https://api.example-analytics.internal/accounts/{}/datasets/{}/events",
                account_id, dataset
            );
            let result = http
                .post(&url)
                .bearer_auth(&api_token)
                .json(&point)
                .send()
                .await;

            if let Err(e) = result {
                tracing::warn!(error = %e, event = point.event, "failed to emit data point");
            }
        });
    }

    pub fn emit_publish(&self, project: &str, stream_id: &str) {
        self.emit(
            DataPoint::new("publish", "publish", now_ms())
                .with_project(project)
                .with_stream(stream_id),
        );
    }

    pub fn emit_publish_error(&self, project: &str, stream_id: &str) {
        self.emit(
            DataPoint::new("publish", "publish_error", now_ms())
                .with_project(project)
                .with_stream(stream_id),
        );
    }

    pub fn emit_fanout(&self, project: &str, stream_id: &str, count: u64, mode: &'static str) {
        self.emit(
            DataPoint::new("publish", if mode == "queued" { "fanout_queued" } else { "fanout" }, now_ms())
                .with_project(project)
                .with_stream(stream_id)
                .with_count(count),
        );
    }

    pub fn emit_subscribe(&self, project: &str, session_id: &str, stream_id: &str) {
        self.emit(
            DataPoint::new("subscription", "subscribe", now_ms())
                .with_project(project)
                .with_session(session_id)
                .with_stream(stream_id),
        );
    }

    pub fn emit_unsubscribe(&self, project: &str, session_id: &str, stream_id: &str) {
        self.emit(
            DataPoint::new("subscription", "unsubscribe", now_ms())
                .with_project(project)
                .with_session(session_id)
                .with_stream(stream_id),
        );
    }

    pub fn emit_session_create(&self, project: &str, session_id: &str, ttl_seconds: u64) {
        self.emit(
            DataPoint::new("session", "session_create", now_ms())
                .with_project(project)
                .with_session(session_id)
                .with_ttl(ttl_seconds),
        );
    }

    pub fn emit_session_touch(&self, project: &str, session_id: &str, ttl_seconds: u64) {
        self.emit(
            DataPoint::new("session", "session_touch", now_ms())
                .with_project(project)
                .with_session(session_id)
                .with_ttl(ttl_seconds),
        );
    }

    pub fn emit_session_expire(&self, project: &str, session_id: &str) {
        self.emit(
            DataPoint::new("session", "session_expire", now_ms())
                .with_project(project)
                .with_session(session_id),
        );
    }

    pub fn emit_session_delete(&self, project: &str, session_id: &str) {
        self.emit(
            DataPoint::new("session", "session_delete", now_ms())
                .with_project(project)
                .with_session(session_id),
        );
    }

    pub fn emit_cleanup_batch(&self, count: u64) {
        self.emit(DataPoint::new("session", "cleanup_batch", now_ms()).with_count(count));
    }

    pub fn emit_http(&self, stream_id: &str, count: u64) {
        self.emit(
            DataPoint::new("log_client", "http", now_ms())
                .with_stream(stream_id)
                .with_count(count),
        );
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_credentials_reports_false() {
        let sink = MetricsSink::new(AnalyticsConfig {
            account_id: None,
            api_token: None,
            dataset: "streamfabric".into(),
        });
        assert!(!sink.has_credentials());
    }

    #[test]
    fn test_credentials_present() {
        let sink = MetricsSink::new(AnalyticsConfig {
            account_id: Some("acct".into()),
            api_token: Some("tok".into()),
            dataset: "streamfabric".into(),
        });
        assert!(sink.has_credentials());
    }

    #[tokio::test]
    async fn test_emit_without_credentials_does_not_panic() {
        let sink = MetricsSink::new(AnalyticsConfig {
            account_id: None,
            api_token: None,
            dataset: "streamfabric".into(),
        });
        sink.emit_publish("proj", "stream1");
    }
}
