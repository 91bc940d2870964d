//! C6 — expiry oracle: derives expired sessions and each session's live
//! subscriptions from the metrics stream, rather than maintaining its own
//! state. Never surfaces an error to callers; on any failure it degrades to
//! an empty result, since cleanup and session lookups must stay best-effort.

use std::sync::Arc;

use serde::Deserialize;

use crate::core::config::AnalyticsConfig;
use crate::error::FabricError;

#[derive(Debug, Clone, Deserialize)]
pub struct ExpiredSession {
    pub project: String,
    pub session_id: String,
    pub last_activity: i64,
    pub ttl_seconds: u64,
}

pub struct ExpiryOracle {
    http: reqwest::Client,
    config: Arc<AnalyticsConfig>,
}

impl ExpiryOracle {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.config.account_id.is_some() && self.config.api_token.is_some()
    }

    /// Sessions whose last `session_create`/`session_touch` activity is
    /// older than their declared TTL, aggregated over the last 24h.
    pub async fn expired_sessions(&self) -> Vec<ExpiredSession> {
        if !self.has_credentials() {
            tracing::debug!("expiry oracle has no analytics credentials, returning empty");
            return Vec::new();
        }

        let query = format!(
            "SELECT session_id, project, max(timestamp) AS last_activity, max(ttl_seconds) AS ttl_seconds \
             FROM {} \
             WHERE category = 'session' AND event IN ('session_create', 'session_touch') \
             AND timestamp > now() - INTERVAL '24' HOUR \
             GROUP BY session_id, project \
             HAVING now() - last_activity > ttl_seconds * 1000",
            self.config.dataset
        );

        match self.run_query::<ExpiredSession>(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "expiry oracle query failed, degrading to empty");
                Vec::new()
            }
        }
    }

    /// Stream ids a session currently has a net-positive subscribe count
    /// for, derived from subscribe/unsubscribe events.
    pub async fn session_streams(&self, project: &str, session_id: &str) -> Vec<String> {
        if !self.has_credentials() {
            return Vec::new();
        }

        let query = format!(
            "SELECT stream_id, sum(CASE WHEN event = 'subscribe' THEN 1 ELSE -1 END) AS net \
             FROM {} \
             WHERE category = 'subscription' AND project = '{}' AND session_id = '{}' \
             GROUP BY stream_id \
             HAVING net > 0",
            self.config.dataset, project, session_id
        );

        #[derive(Deserialize)]
        struct Row {
            stream_id: String,
        }

        match self.run_query::<Row>(&query).await {
            Ok(rows) => rows.into_iter().map(|r| r.stream_id).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "session stream lookup failed, degrading to empty");
                Vec::new()
            }
        }
    }

    /// Re-check a single session's last activity timestamp, used by the
    /// cleanup sweeper to honor the grace window before deleting (`I7`):
    /// if activity advanced past the mark time, the delete must not proceed.
    pub async fn last_activity(&self, project: &str, session_id: &str) -> Option<i64> {
        if !self.has_credentials() {
            return None;
        }

        let query = format!(
            "SELECT max(timestamp) AS last_activity FROM {} \
             WHERE category = 'session' AND event IN ('session_create', 'session_touch') \
             AND project = '{}' AND session_id = '{}'",
            self.config.dataset, project, session_id
        );

        #[derive(Deserialize)]
        struct Row {
            last_activity: i64,
        }

        match self.run_query::<Row>(&query).await {
            Ok(rows) => rows.into_iter().next().map(|r| r.last_activity),
            Err(e) => {
                tracing::warn!(error = %e, "last-activity re-check failed, assuming no recent activity");
                None
            }
        }
    }

    async fn run_query<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
    ) -> Result<Vec<T>, FabricError> {
        let account_id = self.config.account_id.as_deref().unwrap_or_default();
        let api_token = self.config.api_token.as_deref().unwrap_or_default();
        let url = format!(
            "https://api.example-analytics.internal/accounts/{}/analytics_engine/sql",
            account_id
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_token)
            .body(query.to_string())
            .send()
            .await
            .map_err(|e| FabricError::AnalyticsQuery(e.to_string()))?;

        resp.json::<Vec<T>>()
            .await
            .map_err(|e| FabricError::AnalyticsQuery(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_sessions_without_credentials_is_empty() {
        let oracle = ExpiryOracle::new(AnalyticsConfig {
            account_id: None,
            api_token: None,
            dataset: "streamfabric".into(),
        });
        assert!(oracle.expired_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_session_streams_without_credentials_is_empty() {
        let oracle = ExpiryOracle::new(AnalyticsConfig {
            account_id: None,
            api_token: None,
            dataset: "streamfabric".into(),
        });
        assert!(oracle.session_streams("proj", "s1").await.is_empty());
    }
}
