//! Router assembly and the server's start/shutdown lifecycle.

use anyhow::Result;
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;

use crate::core::config::AppConfig;
use crate::core::shutdown::ShutdownService;

use super::middleware::{cors, handle_404, require_bearer};
use super::routes::{health, publish, read, session, subscribe, unsubscribe};
use super::state::AppState;

pub struct ApiServer {
    state: AppState,
    config: AppConfig,
    shutdown: ShutdownService,
}

impl ApiServer {
    pub fn new(state: AppState, config: AppConfig, shutdown: ShutdownService) -> Self {
        Self {
            state,
            config,
            shutdown,
        }
    }

    fn router(&self) -> Router {
        let auth_token = std::sync::Arc::new(
            self.state.auth_token.as_ref().map(|t| t.to_string()),
        );

        let v1 = Router::new()
            .route("/subscribe", post(subscribe::subscribe))
            .route("/unsubscribe", delete(unsubscribe::unsubscribe))
            .route("/publish/{stream_id}", post(publish::publish))
            .route("/session/{session_id}", get(session::get_session))
            .route("/session/{session_id}", delete(session::delete_session))
            .route("/session/{session_id}/touch", post(session::touch_session))
            .route("/read/{stream_id}", get(read::read))
            .with_state(self.state.clone())
            .layer(from_fn_with_state(auth_token, require_bearer));

        Router::new()
            .nest("/v1", v1)
            .route("/health", get(health::health))
            .route("/health/ready", get(health::ready))
            .fallback(handle_404)
            .layer(cors(&self.config.cors_origins))
            .with_state(self.state.clone())
    }

    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "streamfabric listening");

        let router = self.router();
        axum::serve(listener, router)
            .with_graceful_shutdown(self.shutdown.wait())
            .await?;

        Ok(())
    }
}
