use crate::lock;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use vacation_ledger_core::dead_letter::{DeadLetterError, DeadLetterSink, FailureReport};
use vacation_ledger_core::event_bus::Envelope;

/// A recorded dead letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterEntry {
    /// Id assigned by the queue
    pub id: i64,
    /// The message that failed
    pub envelope: Envelope,
    /// Why it failed
    pub report: FailureReport,
}

/// Dead letter sink that keeps entries in memory.
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterQueue {
    entries: Mutex<Vec<DeadLetterEntry>>,
    fail_writes: AtomicBool,
}

impl InMemoryDeadLetterQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of recorded entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        lock(&self.entries).clone()
    }
}

impl DeadLetterSink for InMemoryDeadLetterQueue {
    fn record<'a>(
        &'a self,
        envelope: &'a Envelope,
        report: &'a FailureReport,
    ) -> Pin<Box<dyn Future<Output = Result<i64, DeadLetterError>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DeadLetterError::Storage("injected failure".into()));
            }
            let mut entries = lock(&self.entries);
            let id = i64::try_from(entries.len()).unwrap_or(i64::MAX) + 1;
            entries.push(DeadLetterEntry {
                id,
                envelope: envelope.clone(),
                report: report.clone(),
            });
            Ok(id)
        })
    }
}
