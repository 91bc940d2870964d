//! Shared application state handlers are given via axum's `State` extractor.

use std::sync::Arc;

use crate::cache::EdgeCache;
use crate::core::shutdown::ShutdownService;
use crate::expiry::ExpiryOracle;
use crate::fanout::FanoutQueue;
use crate::log_client::LogClient;
use crate::metrics::MetricsSink;
use crate::session::SessionController;
use crate::subscription::SubscriptionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriptionRegistry>,
    pub sessions: Arc<SessionController>,
    pub log_client: Arc<LogClient>,
    pub edge_cache: Arc<EdgeCache>,
    pub metrics: Arc<MetricsSink>,
    pub oracle: Arc<ExpiryOracle>,
    pub fanout_queue: Option<Arc<FanoutQueue>>,
    pub session_ttl_seconds: u64,
    pub auth_token: Option<Arc<str>>,
    pub shutdown: ShutdownService,
}
