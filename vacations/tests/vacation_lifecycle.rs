//! Booking, cancellation and the daily status pipeline over the in-memory
//! store and bus.

#![allow(clippy::unwrap_used)]

mod common;

use common::{WAIT, date, employee, spawn_consumer};
use rust_decimal_macros::dec;
use std::sync::Arc;
use vacation_ledger_core::event_bus::publish_json;
use vacation_ledger_runtime::Trigger;
use vacation_ledger_testing::{InMemoryDeadLetterQueue, InMemoryEventBus, ManualClock, init_test_tracing};
use vacations::events::{STATUS_TOPIC, StatusAction, StatusChangeRequested};
use vacations::store::{InMemoryLedgerStore, LedgerStore};
use vacations::types::{ConsumptionAction, Days, VacationId, VacationStatus};
use vacations::vacation::{ScheduleRequest, VacationError, VacationService, VacationStatusApplier, VacationTrigger};

struct Harness {
    store: InMemoryLedgerStore,
    bus: Arc<InMemoryEventBus>,
    clock: Arc<ManualClock>,
    service: VacationService,
    trigger: VacationTrigger,
    _shutdown: tokio::sync::broadcast::Sender<()>,
}

fn harness() -> Harness {
    init_test_tracing();
    let store = InMemoryLedgerStore::new();
    let bus = Arc::new(InMemoryEventBus::new());
    let clock = Arc::new(ManualClock::on(date(2024, 2, 20)));
    let dead_letters = Arc::new(InMemoryDeadLetterQueue::new());
    let (shutdown, _) = spawn_consumer(
        "vacation-status-applier",
        STATUS_TOPIC,
        &bus,
        &dead_letters,
        Arc::new(VacationStatusApplier::new(Arc::new(store.clone()))),
    );
    Harness {
        service: VacationService::new(Arc::new(store.clone())),
        trigger: VacationTrigger::new(Arc::new(store.clone()), bus.clone(), clock.clone(), STATUS_TOPIC),
        store,
        bus,
        clock,
        _shutdown: shutdown,
    }
}

impl Harness {
    async fn run_day(&self) {
        self.trigger.fire().await.unwrap();
        assert!(self.bus.wait_until_consumed(STATUS_TOPIC, WAIT).await);
    }

    async fn status(&self, id: VacationId) -> VacationStatus {
        self.service.find_one(id).await.unwrap().schedule.status
    }
}

#[tokio::test]
async fn booking_checks_balance_and_overlap() {
    let h = harness();
    let carla = employee(&h.store, "Carla Souza", dec!(8.75)).await;

    let first = h
        .service
        .schedule(ScheduleRequest {
            employee_id: carla.id,
            start_date: date(2024, 3, 1),
            end_date: date(2024, 3, 5),
        })
        .await
        .unwrap();
    assert_eq!(first.total_days, 5);
    assert_eq!(first.status, VacationStatus::Scheduled);

    let overlapping = h
        .service
        .schedule(ScheduleRequest {
            employee_id: carla.id,
            start_date: date(2024, 3, 4),
            end_date: date(2024, 3, 6),
        })
        .await;
    assert_eq!(overlapping.unwrap_err(), VacationError::Overlap(first.id));

    let too_long = h
        .service
        .schedule(ScheduleRequest {
            employee_id: carla.id,
            start_date: date(2024, 4, 1),
            end_date: date(2024, 4, 9),
        })
        .await;
    assert!(matches!(too_long, Err(VacationError::InsufficientBalance { requested: 9, .. })));
    assert_eq!(h.store.schedule_count().await, 1);

    // Check-only policy: booking does not debit the balance.
    let balance = h.store.find_employee(carla.id).await.unwrap().unwrap().available_vacation_days;
    assert_eq!(balance, Days::new(dec!(8.75)));
}

#[tokio::test]
async fn vacation_runs_from_start_date_to_the_day_after_its_end() {
    let h = harness();
    let alice = employee(&h.store, "Alice Mendes", dec!(15.00)).await;
    let booked = h
        .service
        .schedule(ScheduleRequest {
            employee_id: alice.id,
            start_date: date(2024, 2, 22),
            end_date: date(2024, 2, 23),
        })
        .await
        .unwrap();

    h.run_day().await;
    assert_eq!(h.status(booked.id).await, VacationStatus::Scheduled);

    h.clock.set_date(date(2024, 2, 22));
    h.run_day().await;
    assert_eq!(h.status(booked.id).await, VacationStatus::InProgress);

    h.clock.advance_days(1);
    h.run_day().await;
    assert_eq!(h.status(booked.id).await, VacationStatus::InProgress);

    h.clock.advance_days(1);
    h.run_day().await;
    assert_eq!(h.status(booked.id).await, VacationStatus::Finalized);

    let log = h.service.consumption_history(booked.id).await.unwrap();
    let actions: Vec<_> = log.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![ConsumptionAction::Started, ConsumptionAction::Finalized]);

    // Nothing left to do on later days.
    h.clock.advance_days(1);
    let report = h.trigger.fire().await.unwrap();
    assert_eq!(report.candidates, 0);
}

#[tokio::test]
async fn canceled_vacation_never_starts() {
    let h = harness();
    let bruno = employee(&h.store, "Bruno Carvalho", dec!(22.50)).await;
    let booked = h
        .service
        .schedule(ScheduleRequest {
            employee_id: bruno.id,
            start_date: date(2024, 2, 21),
            end_date: date(2024, 2, 28),
        })
        .await
        .unwrap();

    // Start request already in flight when the cancellation lands.
    let stale = StatusChangeRequested {
        vacation_id: booked.id,
        employee_id: bruno.id,
        action: StatusAction::Start,
    };
    h.service.cancel(booked.id, Some("Project deadline".into())).await.unwrap();
    publish_json(h.bus.as_ref(), STATUS_TOPIC, &stale.key(), &stale).await.unwrap();
    assert!(h.bus.wait_until_consumed(STATUS_TOPIC, WAIT).await);

    h.clock.set_date(date(2024, 2, 21));
    h.run_day().await;

    assert_eq!(h.status(booked.id).await, VacationStatus::Canceled);
    assert!(h.store.consumption_entries().await.is_empty());
}

#[tokio::test]
async fn cancel_is_refused_once_the_vacation_started() {
    let h = harness();
    let diego = employee(&h.store, "Diego Ferreira", dec!(30.00)).await;
    let booked = h
        .service
        .schedule(ScheduleRequest {
            employee_id: diego.id,
            start_date: date(2024, 2, 20),
            end_date: date(2024, 2, 25),
        })
        .await
        .unwrap();
    h.run_day().await;

    let result = h.service.cancel(booked.id, None).await;

    assert!(matches!(result, Err(VacationError::IllegalTransition(_))));
    assert_eq!(h.status(booked.id).await, VacationStatus::InProgress);
}

#[tokio::test]
async fn duplicate_trigger_runs_apply_each_transition_once() {
    let h = harness();
    let alice = employee(&h.store, "Alice Mendes", dec!(15.00)).await;
    let booked = h
        .service
        .schedule(ScheduleRequest {
            employee_id: alice.id,
            start_date: date(2024, 2, 20),
            end_date: date(2024, 2, 22),
        })
        .await
        .unwrap();

    // Two replicas firing on the same day.
    h.trigger.fire().await.unwrap();
    h.trigger.fire().await.unwrap();
    assert!(h.bus.wait_until_consumed(STATUS_TOPIC, WAIT).await);

    assert_eq!(h.status(booked.id).await, VacationStatus::InProgress);
    assert_eq!(h.store.consumption_log(booked.id).await.unwrap().len(), 1);
}
