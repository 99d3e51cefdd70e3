//! Publishes status changes for vacations whose dates were crossed.
//!
//! `start` for every Scheduled vacation starting today, `finalize` for every
//! InProgress vacation that ended before today. A vacation that began on an
//! earlier day while the trigger was down is not picked up again.

use crate::events::{StatusAction, StatusChangeRequested};
use crate::store::LedgerStore;
use crate::types::VacationSchedule;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use vacation_ledger_core::environment::Clock;
use vacation_ledger_core::event_bus::EventBus;
use vacation_ledger_runtime::{Trigger, TriggerError, TriggerReport, publish_each};

/// Periodic vacation status job.
pub struct VacationTrigger {
    store: Arc<dyn LedgerStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    topic: String,
}

impl VacationTrigger {
    /// Create the trigger.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            topic: topic.into(),
        }
    }

    async fn publish(&self, schedules: Vec<VacationSchedule>, action: StatusAction) -> TriggerReport {
        let requests = schedules.into_iter().map(|schedule| {
            let request = StatusChangeRequested {
                vacation_id: schedule.id,
                employee_id: schedule.employee_id,
                action,
            };
            (request.key(), request)
        });
        publish_each(self.bus.as_ref(), self.name(), &self.topic, requests).await
    }
}

#[async_trait]
impl Trigger for VacationTrigger {
    fn name(&self) -> &'static str {
        "vacation_status"
    }

    async fn fire(&self) -> Result<TriggerReport, TriggerError> {
        let today = self.clock.today();

        let starting = self
            .store
            .scheduled_starting_on(today)
            .await
            .map_err(|e| TriggerError::Candidates(e.to_string()))?;
        let ended = self
            .store
            .in_progress_ended_before(today)
            .await
            .map_err(|e| TriggerError::Candidates(e.to_string()))?;

        info!(
            date = %today,
            starting = starting.len(),
            ended = ended.len(),
            "Publishing vacation status changes"
        );

        let started = self.publish(starting, StatusAction::Start).await;
        let finalized = self.publish(ended, StatusAction::Finalize).await;
        Ok(started.combine(finalized))
    }
}
