//! Chat relay - Entry Point
//!
//! Parses configuration, sets up logging and runs the relay server.

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use chat_relay::{server, Config};

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    if let Err(e) = server::run(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
