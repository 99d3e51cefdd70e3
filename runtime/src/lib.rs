//! # Vacation Ledger Runtime
//!
//! The moving parts shared by both ledger pipelines:
//!
//! - [`trigger`]: periodic triggers and their scheduler
//! - [`consumer`]: the subscribe-process-reconnect loop with ack discipline
//! - [`retry`]: exponential backoff for transient handler failures
//! - [`metrics`]: Prometheus exporter and pipeline counters
//! - [`health`]: health check reports for readiness probes

/// Retry logic with exponential backoff
pub mod retry;

/// Event bus consumer with dead-lettering
pub mod consumer;

/// Periodic triggers
pub mod trigger;

/// Prometheus metrics for observability
pub mod metrics;

/// Health check reporting
pub mod health;

pub use consumer::{
    ConsumerError, DeliveryProcessor, EventConsumer, HandlerError, HandlerOutcome, MessageHandler,
    Verdict,
};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use metrics::MetricsServer;
pub use retry::RetryPolicy;
pub use trigger::{Trigger, TriggerError, TriggerReport, TriggerScheduler, publish_each};
