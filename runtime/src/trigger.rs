//! Periodic triggers that turn store state into bus messages.
//!
//! A [`Trigger`] reads candidates from the store and publishes one message per
//! candidate. It never mutates the store: the applier on the other side of
//! the bus owns every write, and its idempotency makes repeated or overlapping
//! trigger runs harmless.
//!
//! [`TriggerScheduler`] fires a trigger on a fixed period until shutdown.

use crate::metrics::TriggerMetrics;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use vacation_ledger_core::event_bus::{EventBus, publish_json};

/// Errors that abort a trigger run before anything was published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// Candidates could not be read from the store
    #[error("Failed to enumerate candidates: {0}")]
    Candidates(String),
}

/// Outcome of one trigger run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerReport {
    /// Number of candidates found
    pub candidates: usize,
    /// Number of messages published
    pub published: usize,
    /// Number of messages that failed to publish
    pub failed: usize,
}

impl TriggerReport {
    /// Sum of two partial reports from the same run.
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        Self {
            candidates: self.candidates + other.candidates,
            published: self.published + other.published,
            failed: self.failed + other.failed,
        }
    }
}

/// A periodic job that publishes one message per eligible candidate.
#[async_trait]
pub trait Trigger: Send + Sync {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Run once.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Candidates`] if candidates cannot be enumerated.
    /// Per-candidate publish failures are counted in the report instead.
    async fn fire(&self) -> Result<TriggerReport, TriggerError>;
}

/// Publish each `(key, message)` pair independently.
///
/// A failed publish is logged and counted; the remaining messages are still
/// attempted.
pub async fn publish_each<T, I>(
    bus: &dyn EventBus,
    trigger: &'static str,
    topic: &str,
    messages: I,
) -> TriggerReport
where
    T: Serialize + Sync,
    I: IntoIterator<Item = (String, T)>,
{
    let mut report = TriggerReport::default();

    for (key, message) in messages {
        report.candidates += 1;
        match publish_json(bus, topic, &key, &message).await {
            Ok(()) => {
                report.published += 1;
                TriggerMetrics::record_published(trigger);
            }
            Err(e) => {
                report.failed += 1;
                TriggerMetrics::record_publish_failure(trigger);
                warn!(trigger, topic, key = %key, error = %e, "Failed to publish trigger event");
            }
        }
    }

    report
}

/// Drives a [`Trigger`] on a fixed period.
pub struct TriggerScheduler {
    trigger: Arc<dyn Trigger>,
    period: Duration,
    run_immediately: bool,
    shutdown: broadcast::Receiver<()>,
}

impl TriggerScheduler {
    /// Create a scheduler that first fires one `period` from now.
    #[must_use]
    pub fn new(
        trigger: Arc<dyn Trigger>,
        period: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            trigger,
            period,
            run_immediately: false,
            shutdown,
        }
    }

    /// Fire once right away before settling into the period.
    #[must_use]
    pub const fn run_immediately(mut self, enabled: bool) -> Self {
        self.run_immediately = enabled;
        self
    }

    /// Spawn the scheduler as a background task.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let name = self.trigger.name();
        let start = if self.run_immediately {
            Instant::now()
        } else {
            Instant::now() + self.period
        };
        let mut ticker = tokio::time::interval_at(start, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(trigger = name, period = ?self.period, "Trigger scheduler started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            match self.trigger.fire().await {
                Ok(report) => info!(
                    trigger = name,
                    candidates = report.candidates,
                    published = report.published,
                    failed = report.failed,
                    "Trigger run finished"
                ),
                Err(e) => error!(trigger = name, error = %e, "Trigger run failed"),
            }
        }

        info!(trigger = name, "Trigger scheduler stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vacation_ledger_testing::InMemoryEventBus;

    #[tokio::test]
    async fn publish_each_continues_after_a_failure() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes_for_key("2");

        let messages = vec![("1".to_string(), 1), ("2".to_string(), 2), ("3".to_string(), 3)];
        let report = publish_each(&bus, "test", "numbers", messages).await;

        assert_eq!(
            report,
            TriggerReport {
                candidates: 3,
                published: 2,
                failed: 1
            }
        );
        let keys: Vec<String> = bus.published().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["1", "3"]);
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Trigger for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fire(&self) -> Result<TriggerReport, TriggerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(TriggerReport::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_fires_every_period_until_shutdown() {
        let trigger = Arc::new(Counting(AtomicUsize::new(0)));
        let (tx, rx) = broadcast::channel(1);

        let handle = TriggerScheduler::new(Arc::clone(&trigger) as Arc<dyn Trigger>, Duration::from_secs(60), rx)
            .run_immediately(true)
            .spawn();

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        // t=0, t=60, t=120
        assert_eq!(trigger.0.load(Ordering::SeqCst), 3);
    }
}
