//! Persistence for employees, schedules and the two audit logs.
//!
//! Reads go straight through [`LedgerStore`]. Every mutation runs inside a
//! [`LedgerTx`] obtained from [`LedgerStore::begin`]: the caller locks the row
//! it is about to change, decides what to do from the locked snapshot, writes,
//! and commits. Dropping a transaction without committing rolls it back.
//!
//! # Implementations
//!
//! - [`PostgresLedgerStore`]: `SELECT ... FOR UPDATE` with a per-transaction
//!   `lock_timeout`
//! - [`InMemoryLedgerStore`]: one writer at a time over a staged copy, with
//!   failure injection for tests

use crate::types::{
    AccrualLogEntry, ConsumptionLogEntry, Days, Employee, EmployeeId, NewAccrualLogEntry,
    NewConsumptionLogEntry, NewVacationSchedule, ReferenceMonth, ScheduleView, VacationId,
    VacationSchedule, VacationStatus,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use vacation_ledger_runtime::HandlerError;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

/// Errors raised by a ledger store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A row lock was not granted in time
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// The transaction lost a deadlock or serialization race
    #[error("Serialization failure: {0}")]
    Serialization(String),

    /// A uniqueness constraint rejected the write
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    /// The database refused the values themselves (out of range, check constraint)
    #[error("Rejected by the store: {0}")]
    Rejected(String),

    /// A stored row could not be understood
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Any other database error
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether the failed operation may succeed if attempted again.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::LockTimeout(_) | Self::Serialization(_) | Self::Database(_)
        )
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

/// Read access and transaction entry point.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if no connection can be obtained.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;

    /// Check that the store answers.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented the round trip.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Ids of all active employees, ascending.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn active_employee_ids(&self) -> Result<Vec<EmployeeId>, StoreError>;

    /// Employee by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn find_employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError>;

    /// Every schedule with its employee, by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn list_schedules(&self) -> Result<Vec<ScheduleView>, StoreError>;

    /// One schedule with its employee.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn find_schedule(&self, id: VacationId) -> Result<Option<ScheduleView>, StoreError>;

    /// Schedules of one employee, latest start date first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn schedules_for_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<VacationSchedule>, StoreError>;

    /// Scheduled vacations starting on `date`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn scheduled_starting_on(&self, date: NaiveDate)
    -> Result<Vec<VacationSchedule>, StoreError>;

    /// In-progress vacations whose end date is before `date`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn in_progress_ended_before(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<VacationSchedule>, StoreError>;

    /// Accrual log of one employee, newest period first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn accrual_log(&self, employee_id: EmployeeId)
    -> Result<Vec<AccrualLogEntry>, StoreError>;

    /// Consumption log of one schedule, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    async fn consumption_log(
        &self,
        vacation_id: VacationId,
    ) -> Result<Vec<ConsumptionLogEntry>, StoreError>;
}

/// One open transaction.
///
/// Locks taken through `lock_*` are held until [`LedgerTx::commit`] or drop.
#[async_trait]
pub trait LedgerTx: Send {
    /// Lock an employee row and return its current state.
    async fn lock_employee(&mut self, id: EmployeeId) -> Result<Option<Employee>, StoreError>;

    /// Lock a schedule row and return its current state.
    async fn lock_schedule(
        &mut self,
        id: VacationId,
    ) -> Result<Option<VacationSchedule>, StoreError>;

    /// Whether an accrual for `(employee_id, month)` was already logged.
    async fn accrual_logged(
        &mut self,
        employee_id: EmployeeId,
        month: &ReferenceMonth,
    ) -> Result<bool, StoreError>;

    /// Overwrite an employee's balance.
    async fn set_balance(&mut self, employee_id: EmployeeId, balance: Days)
    -> Result<(), StoreError>;

    /// Append an accrual entry.
    ///
    /// Fails with [`StoreError::Duplicate`] if the period was already logged.
    async fn append_accrual(
        &mut self,
        entry: NewAccrualLogEntry,
    ) -> Result<AccrualLogEntry, StoreError>;

    /// Scheduled and in-progress schedules of an employee.
    async fn open_schedules(
        &mut self,
        employee_id: EmployeeId,
    ) -> Result<Vec<VacationSchedule>, StoreError>;

    /// Create a schedule in the Scheduled state.
    async fn insert_schedule(
        &mut self,
        schedule: NewVacationSchedule,
    ) -> Result<VacationSchedule, StoreError>;

    /// Overwrite a schedule's status and cancellation reason.
    async fn set_status(
        &mut self,
        id: VacationId,
        status: VacationStatus,
        cancellation_reason: Option<String>,
    ) -> Result<VacationSchedule, StoreError>;

    /// Append a consumption entry.
    async fn append_consumption(
        &mut self,
        entry: NewConsumptionLogEntry,
    ) -> Result<ConsumptionLogEntry, StoreError>;

    /// Make every write of this transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::LockTimeout("row 1".into()).is_transient());
        assert!(StoreError::Unavailable("refused".into()).is_transient());
        assert!(StoreError::Serialization("deadlock".into()).is_transient());
        assert!(!StoreError::Duplicate("uq".into()).is_transient());
        assert!(!StoreError::Corrupt("status".into()).is_transient());
        assert!(!StoreError::Rejected("numeric field overflow".into()).is_transient());
    }
}
