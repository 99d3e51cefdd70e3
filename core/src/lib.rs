//! # Vacation Ledger Core
//!
//! Core traits and types shared by every vacation ledger crate.
//!
//! The ledger is driven by two asynchronous pipelines that follow the same
//! shape: a periodic trigger enumerates candidates and publishes one message
//! per candidate, and an idempotent applier consumes those messages and mutates
//! the store. This crate holds the transport-neutral pieces of that shape:
//!
//! - [`event_bus::EventBus`]: keyed publish and acknowledgeable subscriptions
//! - [`event_bus::Envelope`] / [`event_bus::Delivery`]: a message and its ack handle
//! - [`dead_letter::DeadLetterSink`]: where exhausted messages end up
//! - [`environment::Clock`]: injectable time for triggers and audit timestamps
//!
//! ## Delivery contract
//!
//! ```text
//! Trigger ──publish(topic, key, payload)──▶ EventBus ──Delivery──▶ Consumer
//!                                              ▲                      │
//!                                              └──── ack / nack ◀─────┘
//! ```
//!
//! A delivery that is dropped without an explicit ack counts as a nack and is
//! redelivered. Ordering holds only for messages sharing a partition key.

pub use chrono::{DateTime, NaiveDate, Utc};

pub mod dead_letter;
pub mod event_bus;

/// Environment traits injected into triggers, appliers and services.
pub mod environment {
    use chrono::{DateTime, NaiveDate, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use vacation_ledger_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// assert_eq!(clock.today(), clock.now().date_naive());
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current calendar day (UTC).
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// Wall clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_today_matches_now() {
        let clock = SystemClock;
        let before = clock.now().date_naive();
        let today = clock.today();
        assert!(today >= before);
    }
}
