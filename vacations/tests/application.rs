//! Full application wiring over in-memory dependencies.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{WAIT, date, employee};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use vacation_ledger_testing::{FixedClock, InMemoryDeadLetterQueue, InMemoryEventBus, init_test_tracing};
use vacations::Config;
use vacations::app::{Dependencies, assemble};
use vacations::server::LedgerReadiness;
use vacations::store::{InMemoryLedgerStore, LedgerStore};
use vacations::types::{NewVacationSchedule, VacationStatus};

#[tokio::test]
async fn starts_due_vacations_at_startup_and_shuts_down_cleanly() {
    init_test_tracing();
    let today = date(2024, 3, 1);
    let store = InMemoryLedgerStore::new();
    let alice = employee(&store, "Alice Mendes", dec!(15.00)).await;
    let due = store
        .insert_schedule_with_status(
            NewVacationSchedule {
                employee_id: alice.id,
                start_date: today,
                end_date: date(2024, 3, 5),
                total_days: 5,
            },
            VacationStatus::Scheduled,
        )
        .await;

    let deps = Dependencies {
        store: Arc::new(store.clone()),
        bus: Arc::new(InMemoryEventBus::new()),
        dead_letters: Arc::new(InMemoryDeadLetterQueue::new()),
        clock: Arc::new(FixedClock::on(today)),
    };
    let config = Config::from_lookup(|key| match key {
        "SHUTDOWN_TIMEOUT" => Some("5".into()),
        _ => None,
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let readiness = Arc::new(LedgerReadiness::new(Arc::clone(&deps.store)));
    let app = assemble(listener, &deps, readiness, &config).unwrap();
    assert!(app.local_addr().unwrap().port() > 0);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(app.run_until(async move {
        let _ = stop_rx.await;
    }));

    let started = tokio::time::timeout(WAIT, async {
        loop {
            let view = store.find_schedule(due.id).await.unwrap().unwrap();
            if view.schedule.status == VacationStatus::InProgress {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "vacation was not started by the startup run");

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(15), running)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(store.consumption_entries().await.len(), 1);
}
