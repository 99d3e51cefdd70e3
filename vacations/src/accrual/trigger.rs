//! Publishes one accrual request per active employee.

use crate::events::AccrualRequested;
use crate::store::LedgerStore;
use crate::types::{Days, ReferenceMonth};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use vacation_ledger_core::environment::Clock;
use vacation_ledger_core::event_bus::EventBus;
use vacation_ledger_runtime::{Trigger, TriggerError, TriggerReport, publish_each};

/// Periodic accrual job.
pub struct AccrualTrigger {
    store: Arc<dyn LedgerStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    topic: String,
    days_per_period: Days,
}

impl AccrualTrigger {
    /// Create the trigger.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        topic: impl Into<String>,
        days_per_period: Days,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            topic: topic.into(),
            days_per_period,
        }
    }
}

#[async_trait]
impl Trigger for AccrualTrigger {
    fn name(&self) -> &'static str {
        "accrual"
    }

    async fn fire(&self) -> Result<TriggerReport, TriggerError> {
        let reference_month = ReferenceMonth::of(self.clock.today());
        let employees = self
            .store
            .active_employee_ids()
            .await
            .map_err(|e| TriggerError::Candidates(e.to_string()))?;

        info!(
            reference_month = %reference_month,
            active_employees = employees.len(),
            "Publishing accrual requests"
        );

        let requests = employees.into_iter().map(|employee_id| {
            let request = AccrualRequested {
                employee_id,
                days_to_add: self.days_per_period,
                reference_month: reference_month.clone(),
            };
            (request.key(), request)
        });

        Ok(publish_each(self.bus.as_ref(), self.name(), &self.topic, requests).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::events::ACCRUAL_TOPIC;
    use crate::store::{InMemoryLedgerStore, StoreError};
    use crate::types::NewEmployee;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use vacation_ledger_testing::{FixedClock, InMemoryEventBus};

    fn employee(email: &str, is_active: bool) -> NewEmployee {
        NewEmployee {
            name: email.into(),
            email: email.into(),
            department: "Engineering".into(),
            hire_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            available_vacation_days: Days::ZERO,
            is_active,
        }
    }

    fn trigger(store: &InMemoryLedgerStore, bus: &Arc<InMemoryEventBus>) -> AccrualTrigger {
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        AccrualTrigger::new(
            Arc::new(store.clone()),
            bus.clone(),
            Arc::new(clock),
            ACCRUAL_TOPIC,
            Days::new(dec!(1.25)),
        )
    }

    #[tokio::test]
    async fn publishes_one_request_per_active_employee() {
        let store = InMemoryLedgerStore::new();
        let a = store.insert_employee(employee("a@x.com", true)).await;
        store.insert_employee(employee("b@x.com", false)).await;
        let c = store.insert_employee(employee("c@x.com", true)).await;
        let bus = Arc::new(InMemoryEventBus::new());

        let report = trigger(&store, &bus).fire().await.unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.published, 2);
        let published = bus.published_on(ACCRUAL_TOPIC);
        let keys: Vec<_> = published.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec![a.id.to_string(), c.id.to_string()]);

        let request: AccrualRequested = published[0].decode().unwrap();
        assert_eq!(request.reference_month.as_str(), "2024-02");
        assert_eq!(request.days_to_add, Days::new(dec!(1.25)));
    }

    #[tokio::test]
    async fn one_failed_publish_does_not_block_the_rest() {
        let store = InMemoryLedgerStore::new();
        let a = store.insert_employee(employee("a@x.com", true)).await;
        store.insert_employee(employee("b@x.com", true)).await;
        let bus = Arc::new(InMemoryEventBus::new());
        bus.fail_publishes_for_key(a.id.to_string());

        let report = trigger(&store, &bus).fire().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.published, 1);
        assert_eq!(bus.published_on(ACCRUAL_TOPIC).len(), 1);
    }

    #[tokio::test]
    async fn store_failure_aborts_the_run() {
        let store = InMemoryLedgerStore::new();
        store.fail_reads(Some(StoreError::Unavailable("refused".into())));
        let bus = Arc::new(InMemoryEventBus::new());

        let err = trigger(&store, &bus).fire().await.unwrap_err();

        assert!(matches!(err, TriggerError::Candidates(_)));
        assert!(bus.published().is_empty());
    }
}
