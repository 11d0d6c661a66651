//! Web control plane.
//!
//! An axum-based HTTP server exposing campaign status and control
//! endpoints, plus the inbound confirmation webhook the chat gateway calls
//! when a subscriber presses the confirm button.

pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::AppState;

/// Build the complete axum router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new().nest("/api", routes::api_router(state))
}

/// Start the web server on the given port
pub async fn start_server(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
