//! Command-line interface definition

use std::path::PathBuf;

use clap::Parser;

use super::constants::{
    ENV_ACCOUNT_ID, ENV_ANALYTICS_DATASET, ENV_API_TOKEN, ENV_AUTH_TOKEN, ENV_CORE_URL,
    ENV_CORS_ORIGINS, ENV_FANOUT_QUEUE, ENV_FANOUT_QUEUE_THRESHOLD, ENV_HOST, ENV_LOG, ENV_PORT,
    ENV_SESSION_TTL_SECONDS,
};

/// A multi-tenant publish/subscribe fabric fronting a durable append-only log service.
#[derive(Parser, Debug, Clone)]
#[command(name = "streamfabric", version, about)]
pub struct Cli {
    /// Host to bind the HTTP server to
    #[arg(long, env = ENV_HOST)]
    pub host: Option<String>,

    /// Port to bind the HTTP server to
    #[arg(long, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Log filter directive (tracing-subscriber EnvFilter syntax)
    #[arg(long, env = ENV_LOG)]
    pub log: Option<String>,

    /// Base URL of the durable log service
    #[arg(long, env = ENV_CORE_URL)]
    pub core_url: Option<String>,

    /// Bearer token the log service expects on northbound requests
    #[arg(long, env = ENV_AUTH_TOKEN)]
    pub auth_token: Option<String>,

    /// Session inactivity TTL in seconds, before a session is eligible for expiry
    #[arg(long, env = ENV_SESSION_TTL_SECONDS)]
    pub session_ttl_seconds: Option<u64>,

    /// Subscriber count at or above which a publish switches to queued fan-out
    #[arg(long, env = ENV_FANOUT_QUEUE_THRESHOLD)]
    pub fanout_queue_threshold: Option<usize>,

    /// Enable queued fan-out delivery (absence forces inline delivery always)
    #[arg(long, env = ENV_FANOUT_QUEUE)]
    pub fanout_queue: bool,

    /// Account id used for analytics/metrics credentials
    #[arg(long, env = ENV_ACCOUNT_ID)]
    pub account_id: Option<String>,

    /// API token used for analytics/metrics credentials
    #[arg(long, env = ENV_API_TOKEN)]
    pub api_token: Option<String>,

    /// Analytics dataset name the metrics sink writes into
    #[arg(long, env = ENV_ANALYTICS_DATASET)]
    pub analytics_dataset: Option<String>,

    /// Comma-separated list of allowed CORS origins (`*` allows any)
    #[arg(long, env = ENV_CORS_ORIGINS)]
    pub cors_origins: Option<String>,

    /// Path to the sqlite file backing subscription and session state
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_with_no_args() {
        let cli = Cli::parse_from(["streamfabric"]);
        assert!(cli.host.is_none());
        assert!(!cli.fanout_queue);
    }

    #[test]
    fn test_parses_explicit_flags() {
        let cli = Cli::parse_from([
            "streamfabric",
            "--core-url",
            "https://log.example.com",
            "--fanout-queue",
            "--session-ttl-seconds",
            "900",
        ]);
        assert_eq!(cli.core_url.as_deref(), Some("https://log.example.com"));
        assert!(cli.fanout_queue);
        assert_eq!(cli.session_ttl_seconds, Some(900));
    }
}
