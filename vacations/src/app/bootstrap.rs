//! Startup sequence.
//!
//! 1. Prometheus exporter and metric descriptions
//! 2. `PostgreSQL` pool and migrations
//! 3. Redpanda event bus and the dead letter queue
//! 4. Pipelines, HTTP state and router
//! 5. TCP listener
//!
//! [`assemble`] is the infrastructure-free half, shared with tests that run
//! the whole application over the in-memory store and bus.

use super::lifecycle::Application;
use super::pipelines::{Dependencies, Pipelines};
use crate::config::Config;
use crate::metrics::register_business_metrics;
use crate::server::{AppState, LedgerReadiness, build_router};
use crate::store::PostgresLedgerStore;
use crate::vacation::VacationService;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;
use vacation_ledger_core::environment::SystemClock;
use vacation_ledger_postgres::{PoolSettings, PostgresDeadLetterQueue, connect};
use vacation_ledger_redpanda::RedpandaEventBus;
use vacation_ledger_runtime::MetricsServer;
use vacation_ledger_web::ReadinessProbe;

/// Connect to every external resource and build the application.
///
/// # Errors
///
/// Returns error if the metrics exporter, database, migrations, event bus or
/// listener cannot be set up.
pub async fn build_application(config: Config) -> anyhow::Result<Application> {
    let metrics_addr: SocketAddr = config
        .metrics_address()
        .parse()
        .context("invalid metrics address")?;
    MetricsServer::new(metrics_addr)
        .start()
        .context("failed to start metrics exporter")?;
    register_business_metrics();

    let pool = connect(&PoolSettings {
        url: config.postgres.url.clone(),
        max_connections: config.postgres.max_connections,
        min_connections: config.postgres.min_connections,
        connect_timeout: Duration::from_secs(config.postgres.connect_timeout),
    })
    .await
    .context("failed to connect to PostgreSQL")?;

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("Database migrations applied");

    let bus = RedpandaEventBus::builder()
        .brokers(config.redpanda.brokers.clone())
        .consumer_group(config.redpanda.consumer_group.clone())
        .auto_offset_reset(config.redpanda.auto_offset_reset.clone())
        .build()
        .context("failed to create Redpanda event bus")?;
    info!(brokers = %config.redpanda.brokers, group = %config.redpanda.consumer_group, "Event bus ready");

    let store = Arc::new(PostgresLedgerStore::new(
        pool.clone(),
        Duration::from_millis(config.postgres.lock_timeout_ms),
    ));
    let dead_letters = PostgresDeadLetterQueue::new(pool);
    let readiness = LedgerReadiness::new(store.clone()).with_dead_letters(dead_letters.clone());

    let deps = Dependencies {
        store,
        bus: Arc::new(bus),
        dead_letters: Arc::new(dead_letters),
        clock: Arc::new(SystemClock),
    };

    let listener = TcpListener::bind(config.server_address())
        .await
        .with_context(|| format!("failed to bind {}", config.server_address()))?;

    assemble(listener, &deps, Arc::new(readiness), &config)
}

/// Build the application from already-connected dependencies.
///
/// # Errors
///
/// Returns error if a pipeline cannot be assembled.
pub fn assemble(
    listener: TcpListener,
    deps: &Dependencies,
    readiness: Arc<dyn ReadinessProbe>,
    config: &Config,
) -> anyhow::Result<Application> {
    let (shutdown_tx, _) = broadcast::channel(1);
    let pipelines = Pipelines::assemble(deps, config, &shutdown_tx)?;

    let state = AppState::new(VacationService::new(Arc::clone(&deps.store)), readiness);
    let router = build_router(state);

    Ok(Application::new(
        listener,
        router,
        pipelines,
        shutdown_tx,
        config.shutdown_timeout(),
    ))
}
