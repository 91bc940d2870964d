//! Application wiring: assembles every component and drives the server and
//! background tasks (cleanup sweeper, queued fan-out consumer).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;

use crate::api::{ApiServer, AppState};
use crate::cache::EdgeCache;
use crate::cleanup::CleanupSweeper;
use crate::core::cli::Cli;
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME, CLEANUP_TICK_INTERVAL_SECS, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::expiry::ExpiryOracle;
use crate::fanout::{self, FanoutEngine};
use crate::log_client::LogClient;
use crate::metrics::MetricsSink;
use crate::session::SessionController;
use crate::subscription::registry::SubscriptionRegistry;
use crate::subscription::actor::ActorDeps;

pub struct FabricApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub state: AppState,
}

impl FabricApp {
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        let cli = Cli::parse_args();
        Self::init_logging(cli.log.as_deref());

        tracing::debug!("Application starting");

        let app = Self::init(&cli).await?;
        Self::start(app).await
    }

    async fn init(cli: &Cli) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite://{}?mode=rwc", config.db_path.display()))
            .await
            .with_context(|| format!("failed to open sqlite database at {}", config.db_path.display()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS subscribers ( \
                project TEXT NOT NULL, \
                stream_id TEXT NOT NULL, \
                session_id TEXT NOT NULL, \
                subscribed_at INTEGER NOT NULL, \
                PRIMARY KEY (project, stream_id, session_id) \
            )",
        )
        .execute(&pool)
        .await
        .context("failed to run subscriber table migration")?;

        let metrics = Arc::new(MetricsSink::new(config.analytics.clone()));
        let log_client = Arc::new(LogClient::new(&config.log_service)?.with_metrics(metrics.clone()));
        let oracle = Arc::new(ExpiryOracle::new(config.analytics.clone()));
        let fanout_engine = Arc::new(FanoutEngine::new(log_client.clone()));

        let shutdown = ShutdownService::new();

        let registry_deps = Arc::new(
            ActorDeps::new(log_client.clone(), fanout_engine.clone(), None, metrics.clone())
                .with_queue_threshold(config.fanout.queue_threshold),
        );
        let registry = Arc::new(SubscriptionRegistry::new(pool, registry_deps.clone()));

        let fanout_queue = if config.fanout.queue_enabled {
            let (queue, consumer_handle) =
                fanout::spawn_consumer(log_client.clone(), registry.clone(), metrics.clone());
            shutdown.register(consumer_handle).await;
            let queue = Arc::new(queue);
            registry_deps.set_fanout_queue(queue.clone());
            Some(queue)
        } else {
            None
        };

        let sessions = Arc::new(SessionController::new(
            log_client.clone(),
            oracle.clone(),
            metrics.clone(),
            config.session.ttl_seconds,
        ));

        let edge_cache = Arc::new(EdgeCache::new());

        let state = AppState {
            registry: registry.clone(),
            sessions,
            log_client: log_client.clone(),
            edge_cache,
            metrics: metrics.clone(),
            oracle: oracle.clone(),
            fanout_queue,
            session_ttl_seconds: config.session.ttl_seconds,
            auth_token: config.log_service.auth_token.clone().map(Arc::from),
            shutdown: shutdown.clone(),
        };

        let sweeper = CleanupSweeper::new(oracle, registry, log_client, metrics);
        let sweeper_shutdown = shutdown.subscribe();
        let sweeper_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(sweeper, sweeper_shutdown).await;
        });
        shutdown.register(sweeper_handle).await;

        Ok(Self {
            shutdown,
            config,
            state,
        })
    }

    async fn run_cleanup_loop(sweeper: CleanupSweeper, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(Duration::from_secs(CLEANUP_TICK_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let outcome = sweeper.sweep().await;
                    if outcome.deleted > 0 {
                        tracing::debug!(
                            deleted = outcome.deleted,
                            stream_delete_failures = outcome.stream_delete_failures,
                            subscription_remove_failures = outcome.subscription_remove_failures,
                            "cleanup sweep completed"
                        );
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    fn init_logging(cli_log: Option<&str>) {
        let default_filter = format!("info,{}=info", APP_NAME);

        let filter = cli_log
            .map(|s| s.to_string())
            .or_else(|| std::env::var(ENV_LOG).ok())
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();

        let server = ApiServer::new(app.state, app.config, app.shutdown.clone());
        server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }
}
