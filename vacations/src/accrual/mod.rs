//! Monthly accrual pipeline.
//!
//! ```text
//! AccrualTrigger ──vacation.accrual (key = employeeId)──▶ AccrualApplier ──▶ store
//! ```
//!
//! The trigger publishes one request per active employee per run. The applier
//! credits each `(employee, month)` at most once, so re-running the trigger or
//! redelivering a request never double-credits.

use rust_decimal::Decimal;

pub mod applier;
pub mod trigger;

pub use applier::{AccrualApplier, AccrualOutcome, AccrualSkip};
pub use trigger::AccrualTrigger;

/// Days credited to each active employee per period unless configured otherwise.
pub const DAYS_TO_ACCRUE: Decimal = Decimal::from_parts(125, 0, 0, false, 2);
