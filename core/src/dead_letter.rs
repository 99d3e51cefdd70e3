//! Dead letter sink for messages that cannot be applied.
//!
//! A message lands here when its handler rejected it outright (malformed or
//! unprocessable payload) or kept failing transiently past the retry ceiling.
//! Entries require manual intervention; nothing replays them automatically.

use crate::event_bus::Envelope;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised while recording a dead letter.
#[derive(Error, Debug, Clone)]
pub enum DeadLetterError {
    /// The sink's backing storage rejected the write
    #[error("Failed to record dead letter: {0}")]
    Storage(String),
}

/// Why a message was dead-lettered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    /// Human-readable error message from the last attempt
    pub error_message: String,
    /// Number of attempts made before giving up
    pub attempts: u32,
    /// Whether the failure was classified as retryable
    pub retryable: bool,
}

/// Destination for messages that exhausted their retries.
pub trait DeadLetterSink: Send + Sync {
    /// Persist `envelope` together with its failure report.
    ///
    /// Returns the id of the stored entry.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the entry could not be written;
    /// callers must then leave the message unacknowledged.
    fn record<'a>(
        &'a self,
        envelope: &'a Envelope,
        report: &'a FailureReport,
    ) -> Pin<Box<dyn Future<Output = Result<i64, DeadLetterError>> + Send + 'a>>;
}
