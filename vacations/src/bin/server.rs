//! Vacation Ledger Server
//!
//! Runs the HTTP API, both appliers and (unless disabled) both triggers.
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run server
//! cargo run --bin server
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vacations::Config;
use vacations::app::build_application;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vacations=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vacation Ledger Server...");

    let config = Config::from_env();
    tracing::info!(
        postgres = %config.postgres.url,
        redpanda = %config.redpanda.brokers,
        triggers_enabled = config.scheduler.triggers_enabled,
        "Configuration loaded"
    );

    let app = build_application(config).await?;
    app.run().await?;

    Ok(())
}
