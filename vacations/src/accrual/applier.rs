//! Applies accrual requests to employee balances.
//!
//! One transaction per request:
//!
//! 1. lock the employee row
//! 2. absent or inactive employee: skip
//! 3. `(employee, month)` already logged: skip
//! 4. write `round(before + days, 2)` and append the log entry
//! 5. commit
//!
//! A unique violation on the log insert means a concurrent applier won the
//! race for the same period; it is treated like step 3.

use crate::events::AccrualRequested;
use crate::lifecycle;
use crate::metrics::AccrualMetrics;
use crate::store::{LedgerStore, StoreError};
use crate::types::{AccrualLogEntry, Days, NewAccrualLogEntry};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vacation_ledger_core::event_bus::Envelope;
use vacation_ledger_runtime::{HandlerError, HandlerOutcome, MessageHandler};

/// Why a request changed nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccrualSkip {
    /// The employee does not exist
    EmployeeNotFound,
    /// The employee is inactive
    EmployeeInactive,
    /// The period was already credited
    AlreadyApplied,
}

impl AccrualSkip {
    /// Metric label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmployeeNotFound => "not_found",
            Self::EmployeeInactive => "inactive",
            Self::AlreadyApplied => "duplicate",
        }
    }
}

impl fmt::Display for AccrualSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// Balance credited and logged
    Applied(AccrualLogEntry),
    /// Nothing changed
    Skipped(AccrualSkip),
}

/// Consumer-side half of the accrual pipeline.
pub struct AccrualApplier {
    store: Arc<dyn LedgerStore>,
}

impl AccrualApplier {
    /// Create an applier over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Apply one request in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] that aborted the transaction. Nothing is
    /// written in that case.
    pub async fn apply(&self, request: &AccrualRequested) -> Result<AccrualOutcome, StoreError> {
        let mut tx = self.store.begin().await?;

        let Some(employee) = tx.lock_employee(request.employee_id).await? else {
            return Ok(AccrualOutcome::Skipped(AccrualSkip::EmployeeNotFound));
        };
        if !employee.is_active {
            return Ok(AccrualOutcome::Skipped(AccrualSkip::EmployeeInactive));
        }
        if tx
            .accrual_logged(employee.id, &request.reference_month)
            .await?
        {
            return Ok(AccrualOutcome::Skipped(AccrualSkip::AlreadyApplied));
        }

        let days_added = Days::new(request.days_to_add.value());
        let balance_before = employee.available_vacation_days;
        let balance_after = lifecycle::accrue(balance_before, days_added);

        tx.set_balance(employee.id, balance_after).await?;
        let entry = match tx
            .append_accrual(NewAccrualLogEntry {
                employee_id: employee.id,
                days_added,
                balance_before,
                balance_after,
                reference_month: request.reference_month.clone(),
            })
            .await
        {
            Ok(entry) => entry,
            Err(StoreError::Duplicate(_)) => {
                return Ok(AccrualOutcome::Skipped(AccrualSkip::AlreadyApplied));
            }
            Err(e) => return Err(e),
        };

        match tx.commit().await {
            Ok(()) => Ok(AccrualOutcome::Applied(entry)),
            Err(StoreError::Duplicate(_)) => Ok(AccrualOutcome::Skipped(AccrualSkip::AlreadyApplied)),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MessageHandler for AccrualApplier {
    async fn handle(&self, envelope: &Envelope) -> Result<HandlerOutcome, HandlerError> {
        let request: AccrualRequested = envelope
            .decode()
            .map_err(|e| HandlerError::Rejected(format!("malformed accrual request: {e}")))?;
        if !request.days_to_add.is_positive() {
            return Err(HandlerError::Rejected(format!(
                "daysToAdd must be positive, got {}",
                request.days_to_add
            )));
        }

        match self.apply(&request).await {
            Ok(AccrualOutcome::Applied(entry)) => {
                AccrualMetrics::record_applied();
                info!(
                    employee_id = %entry.employee_id,
                    reference_month = %entry.reference_month,
                    balance_before = %entry.balance_before,
                    balance_after = %entry.balance_after,
                    "Accrual applied"
                );
                Ok(HandlerOutcome::Applied)
            }
            Ok(AccrualOutcome::Skipped(skip)) => {
                AccrualMetrics::record_skipped(skip.as_str());
                match skip {
                    AccrualSkip::AlreadyApplied => debug!(
                        employee_id = %request.employee_id,
                        reference_month = %request.reference_month,
                        "Accrual already applied for period"
                    ),
                    AccrualSkip::EmployeeNotFound | AccrualSkip::EmployeeInactive => info!(
                        employee_id = %request.employee_id,
                        reason = %skip,
                        "Accrual skipped"
                    ),
                }
                Ok(HandlerOutcome::Skipped(skip.to_string()))
            }
            Err(e) => {
                warn!(
                    employee_id = %request.employee_id,
                    reference_month = %request.reference_month,
                    error = %e,
                    "Accrual transaction failed"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::events::ACCRUAL_TOPIC;
    use crate::store::InMemoryLedgerStore;
    use crate::types::{EmployeeId, NewEmployee, ReferenceMonth};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    async fn store_with(balance: Days, is_active: bool) -> (InMemoryLedgerStore, EmployeeId) {
        let store = InMemoryLedgerStore::new();
        let employee = store
            .insert_employee(NewEmployee {
                name: "Alice Mendes".into(),
                email: "alice.mendes@company.com".into(),
                department: "Engineering".into(),
                hire_date: NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(),
                available_vacation_days: balance,
                is_active,
            })
            .await;
        (store, employee.id)
    }

    fn request(employee_id: EmployeeId, month: &str) -> AccrualRequested {
        AccrualRequested {
            employee_id,
            days_to_add: Days::new(dec!(1.25)),
            reference_month: ReferenceMonth::parse(month).unwrap(),
        }
    }

    #[tokio::test]
    async fn credits_balance_and_logs_once() {
        let (store, id) = store_with(Days::new(dec!(15.00)), true).await;
        let applier = AccrualApplier::new(Arc::new(store.clone()));

        let outcome = applier.apply(&request(id, "2024-02")).await.unwrap();
        let AccrualOutcome::Applied(entry) = outcome else {
            panic!("expected applied, got {outcome:?}");
        };
        assert_eq!(entry.balance_before, Days::new(dec!(15.00)));
        assert_eq!(entry.balance_after, Days::new(dec!(16.25)));

        let again = applier.apply(&request(id, "2024-02")).await.unwrap();
        assert_eq!(again, AccrualOutcome::Skipped(AccrualSkip::AlreadyApplied));

        let employee = store.find_employee(id).await.unwrap().unwrap();
        assert_eq!(employee.available_vacation_days, Days::new(dec!(16.25)));
        assert_eq!(store.accrual_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn next_month_is_credited_separately() {
        let (store, id) = store_with(Days::new(dec!(15.00)), true).await;
        let applier = AccrualApplier::new(Arc::new(store.clone()));

        applier.apply(&request(id, "2024-02")).await.unwrap();
        applier.apply(&request(id, "2024-03")).await.unwrap();

        let employee = store.find_employee(id).await.unwrap().unwrap();
        assert_eq!(employee.available_vacation_days, Days::new(dec!(17.50)));
        let log = store.accrual_log(id).await.unwrap();
        assert_eq!(log[0].reference_month.as_str(), "2024-03");
        assert_eq!(log[0].balance_before, log[1].balance_after);
    }

    #[tokio::test]
    async fn inactive_and_missing_employees_are_skipped() {
        let (store, id) = store_with(Days::new(dec!(5.00)), false).await;
        let applier = AccrualApplier::new(Arc::new(store.clone()));

        assert_eq!(
            applier.apply(&request(id, "2024-02")).await.unwrap(),
            AccrualOutcome::Skipped(AccrualSkip::EmployeeInactive)
        );
        assert_eq!(
            applier.apply(&request(EmployeeId::new(404), "2024-02")).await.unwrap(),
            AccrualOutcome::Skipped(AccrualSkip::EmployeeNotFound)
        );
        assert!(store.accrual_entries().await.is_empty());
    }

    #[tokio::test]
    async fn lock_timeout_is_transient_and_writes_nothing() {
        let (store, id) = store_with(Days::new(dec!(15.00)), true).await;
        store.fail_next_begins(1, &StoreError::LockTimeout("employee row".into()));
        let applier = AccrualApplier::new(Arc::new(store.clone()));
        let envelope = Envelope::json(ACCRUAL_TOPIC, id.to_string(), &request(id, "2024-02")).unwrap();

        let err = applier.handle(&envelope).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.accrual_entries().await.is_empty());

        assert_eq!(applier.handle(&envelope).await.unwrap(), HandlerOutcome::Applied);
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let (store, _) = store_with(Days::ZERO, true).await;
        let applier = AccrualApplier::new(Arc::new(store));

        let garbage = Envelope::new(ACCRUAL_TOPIC, "1", b"not json".to_vec());
        assert!(matches!(
            applier.handle(&garbage).await,
            Err(HandlerError::Rejected(_))
        ));

        let bad_month = Envelope::new(
            ACCRUAL_TOPIC,
            "1",
            br#"{"employeeId":1,"daysToAdd":1.25,"referenceMonth":"2024-13"}"#.to_vec(),
        );
        assert!(matches!(
            applier.handle(&bad_month).await,
            Err(HandlerError::Rejected(_))
        ));

        let negative = Envelope::new(
            ACCRUAL_TOPIC,
            "1",
            br#"{"employeeId":1,"daysToAdd":-1.25,"referenceMonth":"2024-02"}"#.to_vec(),
        );
        assert!(matches!(
            applier.handle(&negative).await,
            Err(HandlerError::Rejected(_))
        ));
    }
}
