//! Demo data loader.
//!
//! Applies migrations and loads `seeds/demo.sql`: five employees (one
//! inactive), one schedule per status, and sample accrual and consumption
//! history. Running it twice changes nothing.
//!
//! ```bash
//! cargo run --bin seed
//! ```

use anyhow::Context;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vacation_ledger_postgres::{PoolSettings, connect};
use vacations::Config;

const DEMO_DATA: &str = include_str!("../../seeds/demo.sql");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let pool = connect(&PoolSettings {
        url: config.postgres.url.clone(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout: Duration::from_secs(config.postgres.connect_timeout),
    })
    .await
    .context("failed to connect to PostgreSQL")?;

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    sqlx::raw_sql(DEMO_DATA)
        .execute(&pool)
        .await
        .context("failed to load demo data")?;

    let (employees,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM employees")
        .fetch_one(&pool)
        .await?;
    let (schedules,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vacation_schedules")
        .fetch_one(&pool)
        .await?;
    tracing::info!(employees, schedules, "Demo data loaded");

    Ok(())
}
