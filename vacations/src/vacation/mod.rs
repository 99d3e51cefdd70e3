//! Vacation booking and status pipeline.
//!
//! - [`VacationService`]: synchronous schedule / cancel / query
//! - [`VacationTrigger`]: daily scan for crossed start and end dates
//! - [`VacationStatusApplier`]: advances schedules on `start` / `finalize`

use crate::lifecycle::{IllegalTransition, InvalidRange};
use crate::store::StoreError;
use crate::types::{EmployeeId, VacationId};
use thiserror::Error;

pub mod applier;
pub mod service;
pub mod trigger;

pub use applier::{StatusOutcome, VacationStatusApplier};
pub use service::{ScheduleRequest, VacationService, MAX_REASON_LENGTH};
pub use trigger::VacationTrigger;

/// Failures of the synchronous vacation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VacationError {
    /// No employee with this id
    #[error("Employee {0} not found")]
    EmployeeNotFound(EmployeeId),

    /// No schedule with this id
    #[error("Vacation schedule {0} not found")]
    VacationNotFound(VacationId),

    /// End date is not after start date
    #[error(transparent)]
    InvalidRange(#[from] InvalidRange),

    /// Cancellation reason exceeds the stored length
    #[error("Cancellation reason must be at most {max} characters, got {actual}")]
    InvalidReason {
        /// Allowed length
        max: usize,
        /// Submitted length
        actual: usize,
    },

    /// Requested days exceed the available balance
    #[error("Insufficient vacation balance: requested {requested} days, available {available}")]
    InsufficientBalance {
        /// Inclusive day count of the request
        requested: i64,
        /// Balance at request time
        available: String,
    },

    /// Dates collide with an open schedule of the same employee
    #[error("Vacation period overlaps with existing schedule {0}")]
    Overlap(VacationId),

    /// The schedule's status does not allow the operation
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// The store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}
