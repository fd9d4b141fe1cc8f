//! Relay server
//!
//! Builds the router over the shared `ChatState` and serves it until Ctrl+C.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::AppError;
use crate::handler::{health_check, list_rooms, ws_handler};
use crate::state::ChatState;

/// Routes served by the relay
pub fn router(state: Arc<ChatState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms", get(list_rooms))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: Arc<ChatState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    info!("Chat relay listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Chat relay shut down");
    Ok(())
}

/// Seed state from `config`, bind, and serve until Ctrl+C
pub async fn run(config: Config) -> Result<(), AppError> {
    let state = Arc::new(ChatState::from_config(&config).await);
    info!(
        "Seeded {} room(s) and {} user(s)",
        state.rooms.len().await,
        state.users.len().await
    );

    let listener = TcpListener::bind(config.bind_addr()).await?;
    serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
