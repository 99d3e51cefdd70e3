//! Prometheus metrics for the trigger and consumer pipelines.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `trigger_events_published_total{trigger}` - events a trigger published
//! - `trigger_publish_failures_total{trigger}` - per-candidate publish failures
//! - `consumer_messages_total{consumer,outcome}` - deliveries by outcome
//!   (`applied`, `skipped`, `dead_lettered`, `redelivered`)
//! - `dead_letters_total{topic}` - messages handed to the dead letter sink
//! - `retry_attempts_total` / `retry_successes_total` / `retry_exhausted_total`
//!
//! Domain crates register their own counters next to these.
//!
//! # Example
//!
//! ```rust,no_run
//! use vacation_ledger_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and serves the scrape endpoint on `addr`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built. A recorder that is
    /// already installed (e.g., by another test) is tolerated with a warning.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if let Err(e) = metrics::set_global_recorder(recorder) {
            let err_msg = e.to_string();
            if err_msg.contains("already") {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                return Ok(());
            }
            return Err(MetricsError::Install(err_msg));
        }

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Triggers
    describe_counter!(
        "trigger_events_published_total",
        "Total number of events published by triggers"
    );
    describe_counter!(
        "trigger_publish_failures_total",
        "Total number of per-candidate publish failures"
    );

    // Consumers
    describe_counter!(
        "consumer_messages_total",
        "Total number of deliveries processed, by consumer and outcome"
    );
    describe_counter!(
        "dead_letters_total",
        "Total number of messages handed to the dead letter sink"
    );

    // Retry
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!(
        "retry_successes_total",
        "Total number of operations that succeeded after retrying"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted max retries"
    );
}

/// Trigger metrics recorder.
pub struct TriggerMetrics;

impl TriggerMetrics {
    /// Record one published event.
    pub fn record_published(trigger: &'static str) {
        counter!("trigger_events_published_total", "trigger" => trigger).increment(1);
    }

    /// Record one failed publish.
    pub fn record_publish_failure(trigger: &'static str) {
        counter!("trigger_publish_failures_total", "trigger" => trigger).increment(1);
    }
}

/// Consumer metrics recorder.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// Record a delivery outcome.
    pub fn record_outcome(consumer: &str, outcome: &'static str) {
        counter!(
            "consumer_messages_total",
            "consumer" => consumer.to_owned(),
            "outcome" => outcome
        )
        .increment(1);
    }

    /// Record a message handed to the dead letter sink.
    pub fn record_dead_letter(topic: &str) {
        counter!("dead_letters_total", "topic" => topic.to_owned()).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
