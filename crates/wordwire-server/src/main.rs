//! # Wordwire Server
//!
//! Realtime collaboration server for the Wordwire wiki editor.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! wordwire
//!
//! # Run with a config file discovered on the default paths
//! wordwire  # reads wordwire.toml if present
//!
//! # Run with environment variables
//! WORDWIRE_PORT=8080 WORDWIRE_REDIS_URL=redis://127.0.0.1 wordwire
//! ```

mod bridge;
mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordwire=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Wordwire server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
