//! # Vacation Ledger Testing
//!
//! Test doubles for the vacation ledger crates.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: a single-group, ack-aware event bus
//! - [`InMemoryDeadLetterQueue`]: a dead letter sink that keeps entries in memory
//! - [`FixedClock`] / [`ManualClock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use vacation_ledger_testing::{InMemoryEventBus, test_clock};
//!
//! #[tokio::test]
//! async fn accrual_is_published() {
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let trigger = AccrualTrigger::new(store, bus.clone(), Arc::new(test_clock()), "vacation.accrual", days);
//!     trigger.fire().await.unwrap();
//!     assert_eq!(bus.published_on("vacation.accrual").len(), 4);
//! }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use vacation_ledger_core::environment::Clock;

mod dead_letter;
mod event_bus;

pub use dead_letter::{DeadLetterEntry, InMemoryDeadLetterQueue};
pub use event_bus::InMemoryEventBus;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Mutex, NaiveDate, Utc, lock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use vacation_ledger_testing::mocks::FixedClock;
    /// use vacation_ledger_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// A clock stopped at noon UTC on `date`.
        #[must_use]
        pub fn on(date: NaiveDate) -> Self {
            Self::new(noon(date))
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock stopped at noon UTC on `date`.
        #[must_use]
        pub fn on(date: NaiveDate) -> Self {
            Self {
                time: Mutex::new(noon(date)),
            }
        }

        /// Move the clock to noon UTC on `date`.
        pub fn set_date(&self, date: NaiveDate) {
            *lock(&self.time) = noon(date);
        }

        /// Advance the clock by whole days.
        pub fn advance_days(&self, days: i64) {
            let mut time = lock(&self.time);
            *time += chrono::Duration::days(days);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *lock(&self.time)
        }
    }

    fn noon(date: NaiveDate) -> DateTime<Utc> {
        date.and_hms_opt(12, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }

    /// Create a fixed clock for testing
    ///
    /// Returns a clock fixed at 2025-01-01 00:00:00 UTC.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{FixedClock, ManualClock, test_clock};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn manual_clock_moves_by_days() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap_or_default();
        let clock = ManualClock::on(start);
        clock.advance_days(2);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default());

        clock.set_date(start);
        assert_eq!(clock.today(), start);
    }
}
