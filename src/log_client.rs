//! C1 — thin typed client for the durable append-only log service.
//!
//! Every other component talks to the log service exclusively through this
//! module; nothing else holds a `reqwest::Client` or knows the log service's
//! URL shape.

use reqwest::{Client, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::LogServiceConfig;
use crate::error::FabricError;
use crate::metrics::MetricsSink;

/// A raw response from the log service, carrying just enough to let callers
/// make fan-out/caching decisions without re-parsing HTTP themselves.
#[derive(Debug, Clone)]
pub struct LogResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl LogResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

/// Extra request headers / query parameters a caller wants forwarded.
#[derive(Debug, Clone, Default)]
pub struct RequestExtras {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestExtras {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Override the client's default request timeout, for long-poll reads
    /// that legitimately hold the connection open past it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone)]
pub struct LogClient {
    http: Client,
    base_url: String,
    auth_token: Option<String>,
    metrics: Option<Arc<MetricsSink>>,
}

impl LogClient {
    pub fn new(config: &LogServiceConfig) -> Result<Self, FabricError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            metrics: None,
        })
    }

    /// Attach the metrics sink so every outbound request emits an `http`
    /// data point. Optional: tests construct a bare `LogClient` with none.
    pub fn with_metrics(mut self, metrics: Arc<MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn url(&self, do_key: &str) -> String {
        format!("{}/{}", self.base_url, do_key)
    }

    async fn send(
        &self,
        method: Method,
        do_key: &str,
        body: Option<Vec<u8>>,
        extras: RequestExtras,
    ) -> Result<LogResponse, FabricError> {
        let mut req = self.http.request(method, self.url(do_key));
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        if let Some(timeout) = extras.timeout {
            req = req.timeout(timeout);
        }
        for (name, value) in &extras.query {
            req = req.query(&[(name, value)]);
        }
        for (name, value) in &extras.headers {
            req = req.header(name, value);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = resp.bytes().await?.to_vec();

        if let Some(metrics) = &self.metrics {
            metrics.emit_http(do_key, 1);
        }

        Ok(LogResponse {
            status,
            headers,
            body,
        })
    }

    /// Put stream metadata (session touch uses this with `X-Stream-Expires-At`).
    pub async fn put_stream(
        &self,
        do_key: &str,
        extras: RequestExtras,
    ) -> Result<LogResponse, FabricError> {
        self.send(Method::PUT, do_key, None, extras).await
    }

    /// Append an entry to a stream. Used both for source writes and fan-out copies.
    pub async fn post_stream(
        &self,
        do_key: &str,
        body: Vec<u8>,
        extras: RequestExtras,
    ) -> Result<LogResponse, FabricError> {
        self.send(Method::POST, do_key, Some(body), extras).await
    }

    /// Check stream existence without reading its body.
    pub async fn head_stream(
        &self,
        do_key: &str,
        extras: RequestExtras,
    ) -> Result<LogResponse, FabricError> {
        self.send(Method::HEAD, do_key, None, extras).await
    }

    /// Delete a stream. Treated idempotently by callers: 404 counts as success.
    pub async fn delete_stream(
        &self,
        do_key: &str,
        extras: RequestExtras,
    ) -> Result<LogResponse, FabricError> {
        self.send(Method::DELETE, do_key, None, extras).await
    }

    /// Read a stream, used both directly and as the origin fetch behind the
    /// edge read cache.
    pub async fn read_stream(
        &self,
        do_key: &str,
        extras: RequestExtras,
    ) -> Result<LogResponse, FabricError> {
        self.send(Method::GET, do_key, None, extras).await
    }
}

/// Build the canonical durable-object key for a stream: `project/streamId`.
pub fn do_key(project: &str, stream_id: &str) -> String {
    format!("{}/{}", project, stream_id)
}

/// Build the durable-object key for a session's own stream.
pub fn session_do_key(project: &str, session_id: &str) -> String {
    do_key(project, &format!("{}{}", crate::core::constants::SESSION_STREAM_PREFIX, session_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_do_key_format() {
        assert_eq!(do_key("proj", "stream1"), "proj/stream1");
    }

    #[test]
    fn test_session_do_key_format() {
        assert_eq!(session_do_key("proj", "abc"), "proj/session:abc");
    }

    #[test]
    fn test_request_extras_builder() {
        let extras = RequestExtras::default()
            .with_header("X-Stream-Expires-At", "123")
            .with_query("offset", "now");
        assert_eq!(extras.headers[0].0, "X-Stream-Expires-At");
        assert_eq!(extras.query[0].1, "now");
    }
}
