//! Wiring of the two trigger → bus → applier pipelines.
//!
//! ```text
//! AccrualTrigger ──vacation.accrual──────▶ EventConsumer(AccrualApplier)
//! VacationTrigger ─vacation.status-update─▶ EventConsumer(VacationStatusApplier)
//! ```
//!
//! Consumers always run. Trigger schedulers run only when
//! `TRIGGERS_ENABLED` is set, so replicas can scale consumption without
//! multiplying publications.

use crate::accrual::{AccrualApplier, AccrualTrigger};
use crate::config::Config;
use crate::store::LedgerStore;
use crate::types::Days;
use crate::vacation::{VacationStatusApplier, VacationTrigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use vacation_ledger_core::dead_letter::DeadLetterSink;
use vacation_ledger_core::environment::Clock;
use vacation_ledger_core::event_bus::EventBus;
use vacation_ledger_runtime::{ConsumerError, EventConsumer, TriggerScheduler};

/// Everything the pipelines are built from.
#[derive(Clone)]
pub struct Dependencies {
    /// Ledger store shared by appliers, triggers and the HTTP service
    pub store: Arc<dyn LedgerStore>,
    /// Message bus
    pub bus: Arc<dyn EventBus>,
    /// Where exhausted messages go
    pub dead_letters: Arc<dyn DeadLetterSink>,
    /// Time source for triggers
    pub clock: Arc<dyn Clock>,
}

/// A background task with the name it is logged under.
pub struct NamedTask {
    /// Log name
    pub name: &'static str,
    /// Task handle
    pub handle: JoinHandle<()>,
}

/// Consumers and trigger schedulers, built but not yet running.
pub struct Pipelines {
    consumers: Vec<(&'static str, EventConsumer)>,
    schedulers: Vec<(&'static str, TriggerScheduler)>,
}

impl Pipelines {
    /// Build both pipelines. Every component subscribes to `shutdown`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] if a consumer cannot be assembled.
    pub fn assemble(
        deps: &Dependencies,
        config: &Config,
        shutdown: &broadcast::Sender<()>,
    ) -> Result<Self, ConsumerError> {
        let retry_policy = config.retry_policy();

        let accrual_consumer = EventConsumer::builder()
            .name("accrual-applier")
            .topics(vec![config.redpanda.accrual_topic.clone()])
            .event_bus(Arc::clone(&deps.bus))
            .handler(Arc::new(AccrualApplier::new(Arc::clone(&deps.store))))
            .dead_letters(Arc::clone(&deps.dead_letters))
            .retry_policy(retry_policy.clone())
            .shutdown(shutdown.subscribe())
            .build()?;

        let status_consumer = EventConsumer::builder()
            .name("vacation-status-applier")
            .topics(vec![config.redpanda.status_topic.clone()])
            .event_bus(Arc::clone(&deps.bus))
            .handler(Arc::new(VacationStatusApplier::new(Arc::clone(&deps.store))))
            .dead_letters(Arc::clone(&deps.dead_letters))
            .retry_policy(retry_policy)
            .shutdown(shutdown.subscribe())
            .build()?;

        let mut schedulers = Vec::new();
        if config.scheduler.triggers_enabled {
            let accrual = AccrualTrigger::new(
                Arc::clone(&deps.store),
                Arc::clone(&deps.bus),
                Arc::clone(&deps.clock),
                config.redpanda.accrual_topic.clone(),
                Days::new(config.scheduler.accrual_days_per_period),
            );
            schedulers.push((
                "accrual-trigger",
                TriggerScheduler::new(
                    Arc::new(accrual),
                    Duration::from_secs(config.scheduler.accrual_interval_secs),
                    shutdown.subscribe(),
                ),
            ));

            let status = VacationTrigger::new(
                Arc::clone(&deps.store),
                Arc::clone(&deps.bus),
                Arc::clone(&deps.clock),
                config.redpanda.status_topic.clone(),
            );
            schedulers.push((
                "vacation-trigger",
                TriggerScheduler::new(
                    Arc::new(status),
                    Duration::from_secs(config.scheduler.vacation_interval_secs),
                    shutdown.subscribe(),
                )
                .run_immediately(true),
            ));
        }

        Ok(Self {
            consumers: vec![
                ("accrual-applier", accrual_consumer),
                ("vacation-status-applier", status_consumer),
            ],
            schedulers,
        })
    }

    /// Number of consumers and schedulers.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        (self.consumers.len(), self.schedulers.len())
    }

    /// Start every component.
    #[must_use]
    pub fn spawn(self) -> Vec<NamedTask> {
        let consumers = self.consumers.into_iter().map(|(name, consumer)| NamedTask {
            name,
            handle: consumer.spawn(),
        });
        let schedulers = self.schedulers.into_iter().map(|(name, scheduler)| NamedTask {
            name,
            handle: scheduler.spawn(),
        });
        consumers.chain(schedulers).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLedgerStore;
    use std::collections::HashMap;
    use vacation_ledger_testing::{InMemoryDeadLetterQueue, InMemoryEventBus, test_clock};

    fn deps() -> Dependencies {
        Dependencies {
            store: Arc::new(InMemoryLedgerStore::new()),
            bus: Arc::new(InMemoryEventBus::new()),
            dead_letters: Arc::new(InMemoryDeadLetterQueue::new()),
            clock: Arc::new(test_clock()),
        }
    }

    #[test]
    fn triggers_can_be_disabled() {
        let (tx, _) = broadcast::channel(1);
        let vars: HashMap<&str, &str> = HashMap::from([("TRIGGERS_ENABLED", "false")]);
        let config = Config::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()));

        let with = Pipelines::assemble(&deps(), &Config::from_lookup(|_| None), &tx);
        let without = Pipelines::assemble(&deps(), &config, &tx);

        assert_eq!(with.map(|p| p.counts()), Ok((2, 2)));
        assert_eq!(without.map(|p| p.counts()), Ok((2, 0)));
    }
}
