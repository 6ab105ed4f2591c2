//! HTTP front end for the query engine.
//!
//! The server is organized into separate concerns:
//! - `types`: request and response bodies
//! - `handler`: route handlers and the JSON error type
//!
//! Routes:
//! - `GET /` serves the chat page from the static directory
//! - `POST /api/query` answers a conversation
//! - `GET /health` liveness check

mod handler;
mod types;

pub use handler::ApiError;
pub use types::{HistoryPart, HistoryTurn, QueryRequest, QueryResponse};

use crate::chat::ChatManager;
use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared by all handlers.
pub struct AppState {
    pub chat: Arc<ChatManager>,
}

/// Builds the application router.
pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route("/api/query", post(handler::query))
        .route("/health", get(handler::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Web server bound to one address.
pub struct Server {
    state: Arc<AppState>,
    bind: String,
    static_dir: PathBuf,
}

impl Server {
    pub fn new(chat: Arc<ChatManager>, bind: impl Into<String>, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(AppState { chat }),
            bind: bind.into(),
            static_dir: static_dir.into(),
        }
    }

    /// Serves until Ctrl-C.
    pub async fn start(&self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind)
            .await
            .with_context(|| format!("Failed to bind {}", self.bind))?;

        info!(addr = %self.bind, static_dir = %self.static_dir.display(), "Web server listening");

        axum::serve(listener, router(self.state.clone(), &self.static_dir))
            .with_graceful_shutdown(async {
                let _ = signal::ctrl_c().await;
                info!("Shutting down");
            })
            .await
            .context("Server error")?;

        Ok(())
    }
}
