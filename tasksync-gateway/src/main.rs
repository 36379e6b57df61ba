//! `TaskSync` gateway server -- the shared task list clients sync against.
//!
//! An axum WebSocket server holding the authoritative task collection in
//! memory and broadcasting every mutation to all connected clients.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin tasksync-gateway
//!
//! # Run on custom address
//! cargo run --bin tasksync-gateway -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! TASKSYNC_GATEWAY_ADDR=127.0.0.1:8080 cargo run --bin tasksync-gateway
//! ```

use std::sync::Arc;

use clap::Parser;
use tasksync_gateway::config::{GatewayCliArgs, GatewayConfig};
use tasksync_gateway::server::{self, GatewayState};

#[tokio::main]
async fn main() {
    let cli = GatewayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match GatewayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting tasksync gateway server");

    let state = Arc::new(GatewayState::new());

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "gateway server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "gateway server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start gateway server");
            std::process::exit(1);
        }
    }
}
