//! Tasklane API server.
//!
//! An axum JSON server holding the authoritative task table in memory.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:3000
//! cargo run --bin tasklane-server
//!
//! # Run on a custom address
//! cargo run --bin tasklane-server -- --bind 0.0.0.0:8080
//!
//! # Or via environment variable
//! TASKLANE_SERVER_ADDR=0.0.0.0:8080 cargo run --bin tasklane-server
//! ```

use std::sync::Arc;

use clap::Parser;
use tasklane_server::api::{self, ServerState};
use tasklane_server::config::{ServerCliArgs, ServerConfig};

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting tasklane server");

    let state = Arc::new(ServerState::new());
    match api::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "tasklane server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
