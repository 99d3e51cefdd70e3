//! Applies `start` / `finalize` status changes.
//!
//! The schedule row is locked, the transition is validated against its
//! current status, and the new status and consumption entry are written in the
//! same transaction. A request that no longer matches the schedule's status is
//! a no-op: the vacation was canceled in the meantime, or the change was
//! already applied by an earlier delivery.

use crate::events::StatusChangeRequested;
use crate::lifecycle::{self, IllegalTransition, Transition};
use crate::metrics::TransitionMetrics;
use crate::store::{LedgerStore, StoreError};
use crate::types::{ConsumptionAction, ConsumptionLogEntry, NewConsumptionLogEntry, VacationSchedule};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use vacation_ledger_core::event_bus::Envelope;
use vacation_ledger_runtime::{HandlerError, HandlerOutcome, MessageHandler};

/// Result of applying one status change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Status advanced and consumption logged
    Applied {
        /// Schedule after the change
        schedule: VacationSchedule,
        /// Entry written alongside
        entry: ConsumptionLogEntry,
    },
    /// The schedule does not exist
    NotFound,
    /// The schedule's status does not admit the change
    Stale(IllegalTransition),
}

/// Consumer-side half of the vacation status pipeline.
pub struct VacationStatusApplier {
    store: Arc<dyn LedgerStore>,
}

impl VacationStatusApplier {
    /// Create an applier over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Apply one status change in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] that aborted the transaction.
    pub async fn apply(&self, request: &StatusChangeRequested) -> Result<StatusOutcome, StoreError> {
        let mut tx = self.store.begin().await?;

        let Some(schedule) = tx.lock_schedule(request.vacation_id).await? else {
            return Ok(StatusOutcome::NotFound);
        };
        if schedule.employee_id != request.employee_id {
            warn!(
                vacation_id = %schedule.id,
                stored_employee_id = %schedule.employee_id,
                requested_employee_id = %request.employee_id,
                "Status change names a different employee, using the stored one"
            );
        }

        let transition = Transition::from(request.action);
        let status = match lifecycle::next_status(schedule.status, transition) {
            Ok(status) => status,
            Err(illegal) => return Ok(StatusOutcome::Stale(illegal)),
        };

        let action = match transition {
            Transition::Start => ConsumptionAction::Started,
            Transition::Finalize | Transition::Cancel => ConsumptionAction::Finalized,
        };

        let updated = tx.set_status(schedule.id, status, None).await?;
        let entry = tx
            .append_consumption(NewConsumptionLogEntry {
                vacation_schedule_id: schedule.id,
                employee_id: schedule.employee_id,
                action,
            })
            .await?;
        tx.commit().await?;

        Ok(StatusOutcome::Applied {
            schedule: updated,
            entry,
        })
    }
}

#[async_trait]
impl MessageHandler for VacationStatusApplier {
    async fn handle(&self, envelope: &Envelope) -> Result<HandlerOutcome, HandlerError> {
        let request: StatusChangeRequested = envelope
            .decode()
            .map_err(|e| HandlerError::Rejected(format!("malformed status change: {e}")))?;
        let action = request.action.as_str();

        match self.apply(&request).await {
            Ok(StatusOutcome::Applied { schedule, .. }) => {
                TransitionMetrics::record_applied(action);
                info!(
                    vacation_id = %schedule.id,
                    employee_id = %schedule.employee_id,
                    action,
                    status = %schedule.status,
                    "Vacation status updated"
                );
                Ok(HandlerOutcome::Applied)
            }
            Ok(StatusOutcome::NotFound) => {
                TransitionMetrics::record_skipped(action);
                warn!(vacation_id = %request.vacation_id, action, "Vacation not found, skipping");
                Ok(HandlerOutcome::Skipped("not_found".into()))
            }
            Ok(StatusOutcome::Stale(illegal)) => {
                TransitionMetrics::record_skipped(action);
                info!(
                    vacation_id = %request.vacation_id,
                    action,
                    status = %illegal.from,
                    "Status change no longer applies"
                );
                Ok(HandlerOutcome::Skipped(illegal.to_string()))
            }
            Err(e) => {
                warn!(
                    vacation_id = %request.vacation_id,
                    action,
                    error = %e,
                    "Status transaction failed"
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
    use crate::events::{STATUS_TOPIC, StatusAction};
    use crate::store::InMemoryLedgerStore;
    use crate::types::{Days, EmployeeId, NewEmployee, NewVacationSchedule, VacationId, VacationStatus};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn store_with(status: VacationStatus) -> (InMemoryLedgerStore, VacationSchedule) {
        let store = InMemoryLedgerStore::new();
        let employee = store
            .insert_employee(NewEmployee {
                name: "Diego Rocha".into(),
                email: "diego.rocha@company.com".into(),
                department: "Sales".into(),
                hire_date: date(2020, 8, 17),
                available_vacation_days: Days::whole(12),
                is_active: true,
            })
            .await;
        let schedule = store
            .insert_schedule_with_status(
                NewVacationSchedule {
                    employee_id: employee.id,
                    start_date: date(2024, 3, 10),
                    end_date: date(2024, 3, 14),
                    total_days: 5,
                },
                status,
            )
            .await;
        (store, schedule)
    }

    fn request(schedule: &VacationSchedule, action: StatusAction) -> StatusChangeRequested {
        StatusChangeRequested {
            vacation_id: schedule.id,
            employee_id: schedule.employee_id,
            action,
        }
    }

    #[tokio::test]
    async fn start_then_finalize_logs_both_steps() {
        let (store, schedule) = store_with(VacationStatus::Scheduled).await;
        let applier = VacationStatusApplier::new(Arc::new(store.clone()));

        let started = applier.apply(&request(&schedule, StatusAction::Start)).await.unwrap();
        let StatusOutcome::Applied { schedule: updated, entry } = started else {
            panic!("expected applied, got {started:?}");
        };
        assert_eq!(updated.status, VacationStatus::InProgress);
        assert_eq!(entry.action, ConsumptionAction::Started);

        applier.apply(&request(&schedule, StatusAction::Finalize)).await.unwrap();

        let log = store.consumption_log(schedule.id).await.unwrap();
        let actions: Vec<_> = log.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![ConsumptionAction::Started, ConsumptionAction::Finalized]);
        let stored = store.find_schedule(schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.schedule.status, VacationStatus::Finalized);
    }

    #[tokio::test]
    async fn replayed_start_is_a_no_op() {
        let (store, schedule) = store_with(VacationStatus::Scheduled).await;
        let applier = VacationStatusApplier::new(Arc::new(store.clone()));
        let envelope = Envelope::json(STATUS_TOPIC, schedule.id.to_string(), &request(&schedule, StatusAction::Start)).unwrap();

        assert_eq!(applier.handle(&envelope).await.unwrap(), HandlerOutcome::Applied);
        assert!(matches!(
            applier.handle(&envelope).await.unwrap(),
            HandlerOutcome::Skipped(_)
        ));
        assert_eq!(store.consumption_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn canceled_vacation_is_not_started() {
        let (store, schedule) = store_with(VacationStatus::Canceled).await;
        let applier = VacationStatusApplier::new(Arc::new(store.clone()));

        let outcome = applier.apply(&request(&schedule, StatusAction::Start)).await.unwrap();

        assert!(matches!(outcome, StatusOutcome::Stale(IllegalTransition { from: VacationStatus::Canceled, .. })));
        assert!(store.consumption_entries().await.is_empty());
    }

    #[tokio::test]
    async fn finalize_requires_in_progress() {
        let (store, schedule) = store_with(VacationStatus::Scheduled).await;
        let applier = VacationStatusApplier::new(Arc::new(store.clone()));

        let outcome = applier.apply(&request(&schedule, StatusAction::Finalize)).await.unwrap();

        assert!(matches!(outcome, StatusOutcome::Stale(_)));
        let stored = store.find_schedule(schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.schedule.status, VacationStatus::Scheduled);
    }

    #[tokio::test]
    async fn out_of_order_requests_change_nothing() {
        let cases = [
            (StatusAction::Start, VacationStatus::InProgress),
            (StatusAction::Start, VacationStatus::Finalized),
            (StatusAction::Start, VacationStatus::Canceled),
            (StatusAction::Finalize, VacationStatus::Scheduled),
            (StatusAction::Finalize, VacationStatus::Finalized),
            (StatusAction::Finalize, VacationStatus::Canceled),
        ];

        for (action, status) in cases {
            let (store, schedule) = store_with(status).await;
            let applier = VacationStatusApplier::new(Arc::new(store.clone()));

            let outcome = applier.apply(&request(&schedule, action)).await.unwrap();

            assert!(
                matches!(outcome, StatusOutcome::Stale(IllegalTransition { from, .. }) if from == status),
                "{action:?} on {status:?} gave {outcome:?}"
            );
            let stored = store.find_schedule(schedule.id).await.unwrap().unwrap();
            assert_eq!(stored.schedule.status, status, "{action:?} on {status:?}");
            assert!(store.consumption_entries().await.is_empty(), "{action:?} on {status:?}");
        }
    }

    #[tokio::test]
    async fn missing_vacation_is_skipped() {
        let (store, _) = store_with(VacationStatus::Scheduled).await;
        let applier = VacationStatusApplier::new(Arc::new(store));
        let request = StatusChangeRequested {
            vacation_id: VacationId::new(999),
            employee_id: EmployeeId::new(1),
            action: StatusAction::Start,
        };

        assert_eq!(applier.apply(&request).await.unwrap(), StatusOutcome::NotFound);
    }

    #[tokio::test]
    async fn failed_commit_leaves_status_unchanged() {
        let (store, schedule) = store_with(VacationStatus::Scheduled).await;
        store.fail_next_commits(1, &StoreError::Serialization("deadlock detected".into()));
        let applier = VacationStatusApplier::new(Arc::new(store.clone()));
        let envelope = Envelope::json(STATUS_TOPIC, schedule.id.to_string(), &request(&schedule, StatusAction::Start)).unwrap();

        assert!(applier.handle(&envelope).await.unwrap_err().is_transient());
        let stored = store.find_schedule(schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.schedule.status, VacationStatus::Scheduled);
        assert!(store.consumption_entries().await.is_empty());

        assert_eq!(applier.handle(&envelope).await.unwrap(), HandlerOutcome::Applied);
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let (store, _) = store_with(VacationStatus::Scheduled).await;
        let applier = VacationStatusApplier::new(Arc::new(store));
        let envelope = Envelope::new(
            STATUS_TOPIC,
            "1",
            br#"{"vacationId":1,"employeeId":1,"action":"pause"}"#.to_vec(),
        );

        assert!(matches!(applier.handle(&envelope).await, Err(HandlerError::Rejected(_))));
    }
}
