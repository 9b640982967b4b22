//! HTTP API
//!
//! - `GET /` liveness
//! - `POST /api/message` retrieval + generation in `naive`, `advanced` or `compare` mode

pub mod errors;
pub mod handlers;
pub mod models;

use crate::error::{Result, ThemisError};
use crate::retrieval::RagEngine;
use axum::routing::{get, post};
use axum::Router;
use handlers::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn create_router(engine: Arc<RagEngine>) -> Router {
    Router::new()
        .route("/", get(handlers::status))
        .route("/api/message", post(handlers::message))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

/// Serve until Ctrl+C or SIGTERM
pub async fn serve(engine: Arc<RagEngine>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| ThemisError::Io {
            source: e,
            context: format!("Failed to bind {}", bind),
        })?;

    let addr = listener
        .local_addr()
        .map_err(|e| ThemisError::Server(e.to_string()))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, create_router(engine))
        .with_graceful_shutdown(wait_for_signal())
        .await
        .map_err(|e| ThemisError::Server(e.to_string()))
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down");
}
