//! Business metrics for the vacation ledger.
//!
//! # Exported Metrics
//!
//! - `accruals_applied_total` - balance credits committed
//! - `accruals_skipped_total{reason}` - accrual requests acknowledged as no-ops
//! - `vacation_transitions_total{action}` - lifecycle transitions committed
//! - `vacation_transitions_skipped_total{action}` - status changes acknowledged as no-ops

use metrics::{counter, describe_counter};

/// Register all business metric descriptions.
///
/// Call once at startup, after the recorder is installed.
pub fn register_business_metrics() {
    describe_counter!(
        "accruals_applied_total",
        "Total number of accrual requests that credited a balance"
    );
    describe_counter!(
        "accruals_skipped_total",
        "Total number of accrual requests skipped, by reason (duplicate, inactive, not_found)"
    );
    describe_counter!(
        "vacation_transitions_total",
        "Total number of vacation lifecycle transitions, by action (start, finalize, cancel)"
    );
    describe_counter!(
        "vacation_transitions_skipped_total",
        "Total number of status changes skipped because the vacation had already moved on"
    );

    tracing::info!("Business metrics registered");
}

/// Accrual pipeline counters.
pub struct AccrualMetrics;

impl AccrualMetrics {
    /// A credit was committed.
    pub fn record_applied() {
        counter!("accruals_applied_total").increment(1);
    }

    /// A request was acknowledged without a change.
    pub fn record_skipped(reason: &'static str) {
        counter!("accruals_skipped_total", "reason" => reason).increment(1);
    }
}

/// Lifecycle counters.
pub struct TransitionMetrics;

impl TransitionMetrics {
    /// A transition was committed.
    pub fn record_applied(action: &'static str) {
        counter!("vacation_transitions_total", "action" => action).increment(1);
    }

    /// A status change was acknowledged without a change.
    pub fn record_skipped(action: &'static str) {
        counter!("vacation_transitions_skipped_total", "action" => action).increment(1);
    }
}
