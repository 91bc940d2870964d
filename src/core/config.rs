//! Application configuration, assembled from CLI flags / environment variables.

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::cli::Cli;
use super::constants::{
    DEFAULT_FANOUT_QUEUE_THRESHOLD, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SESSION_TTL_SECONDS,
};

/// HTTP server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Credentials and endpoint for the durable log service (C1).
#[derive(Debug, Clone)]
pub struct LogServiceConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
}

/// Credentials for the analytics sink metrics are written to (C2) and
/// queried from (C6).
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub account_id: Option<String>,
    pub api_token: Option<String>,
    pub dataset: String,
}

/// Session lifecycle configuration (C5/C6/C7).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl_seconds: u64,
}

/// Fan-out dispatch configuration (C3/C4/C9).
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    pub queue_threshold: usize,
    pub queue_enabled: bool,
}

/// CORS configuration, parsed from a comma-separated origin list.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

/// Final, merged application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log_service: LogServiceConfig,
    pub analytics: AnalyticsConfig,
    pub session: SessionConfig,
    pub fanout: FanoutConfig,
    pub cors_origins: AllowedOrigins,
    pub db_path: PathBuf,
}

impl AppConfig {
    /// Load configuration from CLI flags, which already carry environment
    /// variable fallbacks via clap's `env` attribute.
    pub fn load(cli: &Cli) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let host = cli.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.unwrap_or(DEFAULT_PORT);

        let core_url = cli
            .core_url
            .clone()
            .context("CORE_URL must be set to the durable log service's base URL")?;

        let session_ttl_seconds = cli
            .session_ttl_seconds
            .unwrap_or(DEFAULT_SESSION_TTL_SECONDS);

        let queue_threshold = cli
            .fanout_queue_threshold
            .unwrap_or(DEFAULT_FANOUT_QUEUE_THRESHOLD);

        let cors_origins = match cli.cors_origins.as_deref() {
            None => AllowedOrigins::List(Vec::new()),
            Some(raw) if raw.trim() == "*" => AllowedOrigins::Any,
            Some(raw) => AllowedOrigins::List(
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        };

        let db_path = cli
            .db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("streamfabric.db"));

        let config = Self {
            server: ServerConfig { host, port },
            log_service: LogServiceConfig {
                base_url: core_url,
                auth_token: cli.auth_token.clone(),
            },
            analytics: AnalyticsConfig {
                account_id: cli.account_id.clone(),
                api_token: cli.api_token.clone(),
                dataset: cli
                    .analytics_dataset
                    .clone()
                    .unwrap_or_else(|| "streamfabric".to_string()),
            },
            session: SessionConfig {
                ttl_seconds: session_ttl_seconds,
            },
            fanout: FanoutConfig {
                queue_threshold,
                queue_enabled: cli.fanout_queue,
            },
            cors_origins,
            db_path,
        };

        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            log_service = %config.log_service.base_url,
            session_ttl_seconds = config.session.ttl_seconds,
            fanout_queue_threshold = config.fanout.queue_threshold,
            fanout_queue_enabled = config.fanout.queue_enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if self.log_service.base_url.is_empty() {
            anyhow::bail!("Configuration error: CORE_URL must not be empty");
        }
        if self.session.ttl_seconds == 0 {
            anyhow::bail!("Configuration error: SESSION_TTL_SECONDS must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn base_cli() -> Cli {
        Cli::parse_from(["streamfabric", "--core-url", "https://log.example.com"])
    }

    #[test]
    fn test_load_applies_defaults() {
        let config = AppConfig::load(&base_cli()).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.session.ttl_seconds, DEFAULT_SESSION_TTL_SECONDS);
        assert!(!config.fanout.queue_enabled);
    }

    #[test]
    fn test_load_requires_core_url() {
        let cli = Cli::parse_from(["streamfabric"]);
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_cors_origins_wildcard() {
        let cli = Cli::parse_from([
            "streamfabric",
            "--core-url",
            "https://log.example.com",
            "--cors-origins",
            "*",
        ]);
        let config = AppConfig::load(&cli).unwrap();
        assert!(matches!(config.cors_origins, AllowedOrigins::Any));
    }

    #[test]
    fn test_cors_origins_list() {
        let cli = Cli::parse_from([
            "streamfabric",
            "--core-url",
            "https://log.example.com",
            "--cors-origins",
            "https://a.example.com, https://b.example.com",
        ]);
        let config = AppConfig::load(&cli).unwrap();
        match config.cors_origins {
            AllowedOrigins::List(origins) => {
                assert_eq!(
                    origins,
                    vec!["https://a.example.com", "https://b.example.com"]
                );
            }
            AllowedOrigins::Any => panic!("expected explicit list"),
        }
    }
}
