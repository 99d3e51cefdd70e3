//! Generic event bus consumer with retry, dead-lettering and reconnection.
//!
//! `EventConsumer` owns the subscribe-process-reconnect loop. Each delivery is
//! handed to a [`MessageHandler`] under a [`RetryPolicy`]; the consumer then
//! settles the delivery with the bus:
//!
//! ```text
//! handler result                      bus verdict
//! ───────────────────────────────────────────────
//! Applied / Skipped                   ack
//! Rejected            → dead letter   ack
//! Transient × retries → dead letter   ack
//! dead letter write failed            nack (redelivered)
//! shutdown mid-message                none (redelivered)
//! ```
//!
//! Handlers must be idempotent: a message acknowledged after a crash between
//! commit and ack is delivered again.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::builder()
//!     .name("accrual")
//!     .topics(vec!["vacation.accrual".to_string()])
//!     .event_bus(event_bus)
//!     .handler(handler)
//!     .dead_letters(dead_letters)
//!     .retry_policy(RetryPolicy::default())
//!     .shutdown(shutdown_rx)
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! ```

use crate::metrics::ConsumerMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use vacation_ledger_core::dead_letter::{DeadLetterSink, FailureReport};
use vacation_ledger_core::event_bus::{DeliveryStream, Envelope, EventBus};

/// What a handler did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The message changed the store.
    Applied,
    /// The message was recognised as a no-op (duplicate, stale, inactive target).
    Skipped(String),
}

/// Why a handler could not finish a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Infrastructure failure worth retrying (lock timeout, connection loss)
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The message itself is unprocessable; retrying cannot help
    #[error("Message rejected: {0}")]
    Rejected(String),
}

impl HandlerError {
    /// Whether the consumer should retry after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Handler for the messages of one subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Apply one message.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Transient`] for failures that may succeed on a
    /// later attempt, [`HandlerError::Rejected`] for malformed messages.
    async fn handle(&self, envelope: &Envelope) -> Result<HandlerOutcome, HandlerError>;
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Handler applied the message.
    Applied,
    /// Handler skipped the message as a no-op.
    Skipped,
    /// Message was written to the dead letter sink.
    DeadLettered,
    /// Message must be delivered again.
    Redeliver,
}

impl Verdict {
    /// Whether the delivery should be acknowledged.
    #[must_use]
    pub const fn is_ack(self) -> bool {
        !matches!(self, Self::Redeliver)
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::DeadLettered => "dead_lettered",
            Self::Redeliver => "redelivered",
        }
    }
}

/// Runs a handler against one envelope and decides the verdict.
#[derive(Clone)]
pub struct DeliveryProcessor {
    name: String,
    handler: Arc<dyn MessageHandler>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry_policy: RetryPolicy,
}

impl DeliveryProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
        dead_letters: Arc<dyn DeadLetterSink>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            dead_letters,
            retry_policy,
        }
    }

    /// Process one envelope to a verdict.
    pub async fn process(&self, envelope: &Envelope) -> Verdict {
        let result = retry_with_predicate(
            &self.retry_policy,
            || self.handler.handle(envelope),
            HandlerError::is_transient,
        )
        .await;

        let verdict = match result {
            Ok(HandlerOutcome::Applied) => Verdict::Applied,
            Ok(HandlerOutcome::Skipped(reason)) => {
                debug!(
                    consumer = %self.name,
                    topic = %envelope.topic,
                    key = %envelope.key,
                    reason = %reason,
                    "Message skipped"
                );
                Verdict::Skipped
            }
            Err(failure) => {
                let report = FailureReport {
                    error_message: failure.error.to_string(),
                    attempts: failure.attempts,
                    retryable: failure.retryable,
                };
                self.dead_letter(envelope, &report).await
            }
        };

        ConsumerMetrics::record_outcome(&self.name, verdict.label());
        verdict
    }

    async fn dead_letter(&self, envelope: &Envelope, report: &FailureReport) -> Verdict {
        match self.dead_letters.record(envelope, report).await {
            Ok(id) => {
                error!(
                    alert = true,
                    consumer = %self.name,
                    topic = %envelope.topic,
                    key = %envelope.key,
                    dead_letter_id = id,
                    attempts = report.attempts,
                    retryable = report.retryable,
                    error = %report.error_message,
                    "Message dead-lettered, manual intervention required"
                );
                ConsumerMetrics::record_dead_letter(&envelope.topic);
                Verdict::DeadLettered
            }
            Err(e) => {
                error!(
                    alert = true,
                    consumer = %self.name,
                    topic = %envelope.topic,
                    key = %envelope.key,
                    error = %e,
                    "Failed to dead-letter message, leaving it for redelivery"
                );
                Verdict::Redeliver
            }
        }
    }
}

/// Errors raised while assembling a consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// A required builder field was not set
    #[error("Event consumer is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Generic event bus consumer.
///
/// Runs until the shutdown signal fires. Subscription failures and stream
/// ends are retried after `retry_delay`.
pub struct EventConsumer {
    topics: Vec<String>,
    event_bus: Arc<dyn EventBus>,
    processor: DeliveryProcessor,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
}

impl EventConsumer {
    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        let name = self.processor.name.clone();
        info!(consumer = %name, "Event consumer started");

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %name, "Event consumer received shutdown signal");
                    break;
                }
                subscribe_result = self.event_bus.subscribe(&topics) => {
                    match subscribe_result {
                        Ok(stream) => {
                            info!(consumer = %name, topics = ?self.topics, "Subscribed to event bus");
                            if self.process_stream(stream).await.is_break() {
                                break;
                            }
                            warn!(consumer = %name, "Event stream ended, reconnecting in {:?}", self.retry_delay);
                        }
                        Err(e) => {
                            error!(
                                consumer = %name,
                                error = %e,
                                "Failed to subscribe to event bus, retrying in {:?}",
                                self.retry_delay
                            );
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %name, "Event consumer stopped");
    }

    /// Returns `Break` when shutdown was requested, `Continue` when the stream ended.
    async fn process_stream(&mut self, mut stream: DeliveryStream) -> std::ops::ControlFlow<()> {
        use std::ops::ControlFlow;

        loop {
            let next = tokio::select! {
                _ = self.shutdown.recv() => return ControlFlow::Break(()),
                next = stream.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(consumer = %self.processor.name, error = %e, "Error receiving message from stream");
                    continue;
                }
                None => return ControlFlow::Continue(()),
            };

            let verdict = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(
                        consumer = %self.processor.name,
                        key = %delivery.envelope().key,
                        "Shutdown during processing, message left unacknowledged"
                    );
                    return ControlFlow::Break(());
                }
                verdict = self.processor.process(delivery.envelope()) => verdict,
            };

            if verdict.is_ack() {
                delivery.ack();
            } else {
                delivery.nack();
                tokio::select! {
                    _ = self.shutdown.recv() => return ControlFlow::Break(()),
                    () = tokio::time::sleep(self.retry_delay) => {}
                }
            }
        }
    }
}

/// Builder for configuring an `EventConsumer`.
#[derive(Default)]
pub struct EventConsumerBuilder {
    name: Option<String>,
    topics: Option<Vec<String>>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn MessageHandler>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    retry_policy: Option<RetryPolicy>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
}

impl EventConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set topics to subscribe to.
    #[must_use]
    pub fn topics(mut self, topics: Vec<String>) -> Self {
        self.topics = Some(topics);
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set message handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set dead letter sink.
    #[must_use]
    pub fn dead_letters(mut self, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    /// Set retry policy for transient handler failures (default: [`RetryPolicy::default`]).
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set reconnect / redelivery delay (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Build the `EventConsumer`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::MissingField`] if name, topics, event bus,
    /// handler, dead letter sink or shutdown receiver is missing.
    pub fn build(self) -> Result<EventConsumer, ConsumerError> {
        let name = self.name.ok_or(ConsumerError::MissingField("name"))?;
        let processor = DeliveryProcessor::new(
            name,
            self.handler.ok_or(ConsumerError::MissingField("handler"))?,
            self.dead_letters
                .ok_or(ConsumerError::MissingField("dead_letters"))?,
            self.retry_policy.unwrap_or_default(),
        );

        Ok(EventConsumer {
            topics: self.topics.ok_or(ConsumerError::MissingField("topics"))?,
            event_bus: self
                .event_bus
                .ok_or(ConsumerError::MissingField("event_bus"))?,
            processor,
            shutdown: self
                .shutdown
                .ok_or(ConsumerError::MissingField("shutdown"))?,
            retry_delay: self.retry_delay.unwrap_or(Duration::from_secs(5)),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vacation_ledger_testing::InMemoryDeadLetterQueue;

    struct Scripted {
        calls: AtomicU32,
        transient_failures: u32,
        reject: bool,
    }

    #[async_trait]
    impl MessageHandler for Scripted {
        async fn handle(&self, _envelope: &Envelope) -> Result<HandlerOutcome, HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(HandlerError::Rejected("bad payload".into()));
            }
            if call < self.transient_failures {
                return Err(HandlerError::Transient("lock timeout".into()));
            }
            Ok(HandlerOutcome::Applied)
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(1))
            .build()
    }

    fn processor(handler: Arc<Scripted>, dlq: Arc<InMemoryDeadLetterQueue>, retries: u32) -> DeliveryProcessor {
        DeliveryProcessor::new("test", handler, dlq, fast_policy(retries))
    }

    fn envelope() -> Envelope {
        Envelope::new("topic", "1", b"{}".to_vec())
    }

    #[tokio::test]
    async fn transient_failure_then_success_is_applied() {
        let handler = Arc::new(Scripted { calls: AtomicU32::new(0), transient_failures: 2, reject: false });
        let dlq = Arc::new(InMemoryDeadLetterQueue::new());

        let verdict = processor(Arc::clone(&handler), Arc::clone(&dlq), 3).process(&envelope()).await;

        assert_eq!(verdict, Verdict::Applied);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(dlq.entries().is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_are_dead_lettered_and_acked() {
        let handler = Arc::new(Scripted { calls: AtomicU32::new(0), transient_failures: u32::MAX, reject: false });
        let dlq = Arc::new(InMemoryDeadLetterQueue::new());

        let verdict = processor(Arc::clone(&handler), Arc::clone(&dlq), 2).process(&envelope()).await;

        assert_eq!(verdict, Verdict::DeadLettered);
        assert!(verdict.is_ack());
        let entries = dlq.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].report.attempts, 3);
        assert!(entries[0].report.retryable);
    }

    #[tokio::test]
    async fn rejected_message_is_dead_lettered_without_retry() {
        let handler = Arc::new(Scripted { calls: AtomicU32::new(0), transient_failures: 0, reject: true });
        let dlq = Arc::new(InMemoryDeadLetterQueue::new());

        let verdict = processor(Arc::clone(&handler), Arc::clone(&dlq), 5).process(&envelope()).await;

        assert_eq!(verdict, Verdict::DeadLettered);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(!dlq.entries()[0].report.retryable);
    }

    #[tokio::test]
    async fn failing_dead_letter_sink_requests_redelivery() {
        let handler = Arc::new(Scripted { calls: AtomicU32::new(0), transient_failures: 0, reject: true });
        let dlq = Arc::new(InMemoryDeadLetterQueue::new());
        dlq.fail_writes(true);

        let verdict = processor(handler, Arc::clone(&dlq), 0).process(&envelope()).await;

        assert_eq!(verdict, Verdict::Redeliver);
        assert!(!verdict.is_ack());
    }

    #[test]
    fn builder_reports_missing_fields() {
        let err = EventConsumer::builder().name("x").build().err().unwrap();
        assert_eq!(err, ConsumerError::MissingField("handler"));
    }
}
