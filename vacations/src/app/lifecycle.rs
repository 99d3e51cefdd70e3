//! Application lifecycle management and graceful shutdown.
//!
//! 1. **Startup**: spawn both consumers and, if enabled, both trigger schedulers
//! 2. **Runtime**: serve HTTP until a shutdown signal arrives
//! 3. **Shutdown**: broadcast shutdown and wait for every background task,
//!    each bounded by the configured timeout
//!
//! A consumer stopped mid-message leaves that message unacknowledged; the bus
//! redelivers it to the next instance.

use super::pipelines::{NamedTask, Pipelines};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Running application with all background tasks.
pub struct Application {
    listener: TcpListener,
    router: axum::Router,
    pipelines: Pipelines,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_timeout: Duration,
}

impl Application {
    /// Create a new application instance.
    #[must_use]
    pub fn new(
        listener: TcpListener,
        router: axum::Router,
        pipelines: Pipelines,
        shutdown_tx: broadcast::Sender<()>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            router,
            pipelines,
            shutdown_tx,
            shutdown_timeout,
        }
    }

    /// Address the HTTP listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the socket cannot report its address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` completes.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run_until(
        self,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let (consumers, schedulers) = self.pipelines.counts();
        info!(consumers, schedulers, "Starting background tasks");
        let tasks = self.pipelines.spawn();

        info!(address = %self.listener.local_addr()?, "HTTP server listening for requests");
        let served = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await;

        info!("HTTP server stopped, initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(());
        Self::await_shutdown(tasks, self.shutdown_timeout).await;
        info!("Graceful shutdown complete");

        served.map_err(Into::into)
    }

    async fn await_shutdown(tasks: Vec<NamedTask>, timeout: Duration) {
        for task in tasks {
            match tokio::time::timeout(timeout, task.handle).await {
                Ok(Ok(())) => info!(task = task.name, "Task stopped gracefully"),
                Ok(Err(e)) => warn!(task = task.name, error = %e, "Task failed"),
                Err(_) => warn!(task = task.name, "Task shutdown timed out"),
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed that signal is never reported; the other
/// one still works.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
