//! Fixtures shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use vacation_ledger_runtime::{EventConsumer, MessageHandler, RetryPolicy};
use vacation_ledger_testing::{InMemoryDeadLetterQueue, InMemoryEventBus};
use vacations::store::InMemoryLedgerStore;
use vacations::types::{Days, Employee, NewEmployee};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn new_employee(name: &str, balance: Decimal, is_active: bool) -> NewEmployee {
    let email = format!("{}@company.com", name.to_lowercase().replace(' ', "."));
    NewEmployee {
        name: name.to_string(),
        email,
        department: "Engineering".into(),
        hire_date: date(2022, 3, 1),
        available_vacation_days: Days::new(balance),
        is_active,
    }
}

pub async fn employee(store: &InMemoryLedgerStore, name: &str, balance: Decimal) -> Employee {
    store.insert_employee(new_employee(name, balance, true)).await
}

pub fn fast_retries() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(2)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

/// A consumer on `topic` running until the returned sender fires.
pub fn spawn_consumer(
    name: &str,
    topic: &str,
    bus: &Arc<InMemoryEventBus>,
    dead_letters: &Arc<InMemoryDeadLetterQueue>,
    handler: Arc<dyn MessageHandler>,
) -> (broadcast::Sender<()>, JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = EventConsumer::builder()
        .name(name)
        .topics(vec![topic.to_string()])
        .event_bus(bus.clone())
        .handler(handler)
        .dead_letters(dead_letters.clone())
        .retry_policy(fast_retries())
        .retry_delay(Duration::from_millis(10))
        .shutdown(shutdown_rx)
        .build()
        .unwrap();
    (shutdown_tx, consumer.spawn())
}

pub const WAIT: Duration = Duration::from_secs(5);
