//! `PostgreSQL` plumbing for the vacation ledger.
//!
//! - [`pool`]: connection pool construction from settings
//! - [`error`]: SQLSTATE classification of `sqlx` errors
//! - [`dead_letter_queue`]: the `failed_messages` table behind the consumers' dead letter sink
//!
//! # Example
//!
//! ```ignore
//! use vacation_ledger_postgres::{PoolSettings, PostgresDeadLetterQueue, connect};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect(&PoolSettings::new("postgres://localhost/vacations")).await?;
//!     let dlq = PostgresDeadLetterQueue::new(pool);
//!     println!("pending dead letters: {}", dlq.count_pending().await?);
//!     Ok(())
//! }
//! ```

pub mod dead_letter_queue;
pub mod error;
pub mod pool;

pub use dead_letter_queue::{DLQStatus, DeadLetterQueueError, FailedMessage, PostgresDeadLetterQueue};
pub use error::{DbErrorKind, classify};
pub use pool::{PoolSettings, connect};
