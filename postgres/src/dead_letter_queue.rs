//! Dead Letter Queue (DLQ) for messages the consumers gave up on.
//!
//! Provides persistent storage of messages that were rejected outright or
//! exhausted their retries, together with the failure that stopped them.
//! Entries wait for an operator; nothing replays them automatically.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use vacation_ledger_core::dead_letter::{DeadLetterError, DeadLetterSink, FailureReport};
use vacation_ledger_core::event_bus::Envelope;

/// Errors from dead letter queue operations.
#[derive(Error, Debug)]
pub enum DeadLetterQueueError {
    /// Query failed
    #[error("Dead letter queue query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored status string is not recognised
    #[error("Invalid DLQ status: {0}")]
    InvalidStatus(String),
}

/// Status of a failed message in the Dead Letter Queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DLQStatus {
    /// Message is waiting for investigation
    Pending,
    /// Message was handled by an operator
    Resolved,
    /// Message was permanently discarded
    Discarded,
}

impl DLQStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, DeadLetterQueueError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(DeadLetterQueueError::InvalidStatus(s.to_string())),
        }
    }
}

/// An entry in the Dead Letter Queue.
#[derive(Debug, Clone)]
pub struct FailedMessage {
    /// Unique identifier for this DLQ entry
    pub id: i64,

    /// The message that failed
    pub envelope: Envelope,

    /// Error message from the last attempt
    pub error_message: String,

    /// Number of processing attempts
    pub attempts: i32,

    /// Whether the failure was classified as retryable
    pub retryable: bool,

    /// When the message was dead-lettered
    pub failed_at: DateTime<Utc>,

    /// Current status
    pub status: DLQStatus,

    /// When the entry was resolved or discarded
    pub resolved_at: Option<DateTime<Utc>>,

    /// Who resolved the entry
    pub resolved_by: Option<String>,

    /// Notes about the resolution
    pub resolution_notes: Option<String>,
}

/// `PostgreSQL`-based Dead Letter Queue backed by the `failed_messages` table.
///
/// # Example
///
/// ```no_run
/// use vacation_ledger_postgres::PostgresDeadLetterQueue;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = PostgresDeadLetterQueue::new(pool);
///
/// let pending = dlq.list_pending(100).await?;
/// println!("Pending failures: {}", pending.len());
///
/// dlq.mark_resolved(pending[0].id, "ops", Some("replayed by hand")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PostgresDeadLetterQueue {
    pool: PgPool,
}

impl PostgresDeadLetterQueue {
    /// Create a new Dead Letter Queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add a failed message to the DLQ.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterQueueError::Database`] if the insert fails.
    pub async fn add_entry(
        &self,
        envelope: &Envelope,
        report: &FailureReport,
    ) -> Result<i64, DeadLetterQueueError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_messages (
                topic, message_key, payload, error_message, attempts, retryable
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(&envelope.topic)
        .bind(&envelope.key)
        .bind(&envelope.payload)
        .bind(&report.error_message)
        .bind(i32::try_from(report.attempts).unwrap_or(i32::MAX))
        .bind(report.retryable)
        .fetch_one(&self.pool)
        .await?;

        tracing::warn!(
            dlq_id = id,
            topic = %envelope.topic,
            key = %envelope.key,
            error = %report.error_message,
            attempts = report.attempts,
            "Message added to Dead Letter Queue"
        );

        metrics::counter!("dead_letter_queue_added_total", "topic" => envelope.topic.clone())
            .increment(1);

        Ok(id)
    }

    /// List pending failed messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterQueueError`] if the query fails or a row is invalid.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<FailedMessage>, DeadLetterQueueError> {
        self.list_by_status(DLQStatus::Pending, limit).await
    }

    /// List failed messages by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterQueueError`] if the query fails or a row is invalid.
    pub async fn list_by_status(
        &self,
        status: DLQStatus,
        limit: usize,
    ) -> Result<Vec<FailedMessage>, DeadLetterQueueError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, topic, message_key, payload, error_message, attempts, retryable,
                failed_at, status, resolved_at, resolved_by, resolution_notes
            FROM failed_messages
            WHERE status = $1
            ORDER BY failed_at ASC, id ASC
            LIMIT $2
            ",
        )
        .bind(status.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_failed_message).collect()
    }

    /// Mark a failed message as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterQueueError::Database`] if the update fails.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), DeadLetterQueueError> {
        self.close(id, DLQStatus::Resolved, Some(resolved_by), notes).await?;
        tracing::info!(dlq_id = id, resolved_by, "DLQ entry marked as resolved");
        metrics::counter!("dead_letter_queue_resolved_total").increment(1);
        Ok(())
    }

    /// Mark a failed message as permanently discarded.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterQueueError::Database`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), DeadLetterQueueError> {
        self.close(id, DLQStatus::Discarded, None, Some(reason)).await?;
        tracing::warn!(dlq_id = id, reason, "DLQ entry marked as discarded");
        metrics::counter!("dead_letter_queue_discarded_total").increment(1);
        Ok(())
    }

    async fn close(
        &self,
        id: i64,
        status: DLQStatus,
        resolved_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<(), DeadLetterQueueError> {
        sqlx::query(
            r"
            UPDATE failed_messages
            SET status = $1,
                resolved_at = NOW(),
                resolved_by = $2,
                resolution_notes = $3
            WHERE id = $4
            ",
        )
        .bind(status.as_str())
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get count of pending failures.
    ///
    /// Useful for monitoring and health checks.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterQueueError::Database`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, DeadLetterQueueError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_messages WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    fn row_to_failed_message(row: &sqlx::postgres::PgRow) -> Result<FailedMessage, DeadLetterQueueError> {
        let status: String = row.try_get("status")?;

        Ok(FailedMessage {
            id: row.try_get("id")?,
            envelope: Envelope::new(
                row.try_get::<String, _>("topic")?,
                row.try_get::<String, _>("message_key")?,
                row.try_get("payload")?,
            ),
            error_message: row.try_get("error_message")?,
            attempts: row.try_get("attempts")?,
            retryable: row.try_get("retryable")?,
            failed_at: row.try_get("failed_at")?,
            status: DLQStatus::parse(&status)?,
            resolved_at: row.try_get("resolved_at")?,
            resolved_by: row.try_get("resolved_by")?,
            resolution_notes: row.try_get("resolution_notes")?,
        })
    }
}

impl DeadLetterSink for PostgresDeadLetterQueue {
    fn record<'a>(
        &'a self,
        envelope: &'a Envelope,
        report: &'a FailureReport,
    ) -> Pin<Box<dyn Future<Output = Result<i64, DeadLetterError>> + Send + 'a>> {
        Box::pin(async move {
            self.add_entry(envelope, report)
                .await
                .map_err(|e| DeadLetterError::Storage(e.to_string()))
        })
    }
}
