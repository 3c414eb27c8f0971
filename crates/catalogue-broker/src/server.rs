//! Web server setup and routing

use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;
use crate::ws;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Symbolic lookups
        .route("/.well-known", get(api::well_known_root))
        .route("/.well-known/", get(api::well_known_root))
        .route("/.well-known/{*path}", get(api::well_known))
        // API routes
        .route("/api/devices", get(api::list_devices))
        .route("/api/databases/{id}/reload", post(api::reload_database))
        .route("/api/databases/{id}", delete(api::remove_database))
        // WebSocket change feed
        .route("/ws", get(ws::websocket_handler))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}
