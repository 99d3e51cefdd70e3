//! Vacation ledger - accrual, booking and lifecycle of employee vacations.
//!
//! Employees accrue vacation days every period, book date ranges against
//! their balance, and bookings move through a small lifecycle as their dates
//! arrive. Two asynchronous pipelines share one shape:
//!
//! ```text
//!  ┌──────────────────┐  publish one   ┌───────────┐  deliver   ┌────────────────────────┐
//!  │ AccrualTrigger   │──per employee─▶│  vacation │──────────▶│ AccrualApplier         │
//!  │ (monthly)        │                │ .accrual  │           │ lock employee, dedup,  │
//!  └──────────────────┘                └───────────┘           │ credit, log            │
//!                                                               └────────────────────────┘
//!  ┌──────────────────┐  publish one   ┌─────────────────┐      ┌────────────────────────┐
//!  │ VacationTrigger  │──per boundary─▶│ vacation        │─────▶│ VacationStatusApplier  │
//!  │ (daily)          │                │ .status-update  │      │ lock schedule, advance │
//!  └──────────────────┘                └─────────────────┘      └────────────────────────┘
//! ```
//!
//! Triggers only read and publish. Appliers own every write and are
//! idempotent, so at-least-once delivery and duplicate trigger runs are safe.
//!
//! # Lifecycle
//!
//! ```text
//! Scheduled ──start──▶ InProgress ──finalize──▶ Finalized
//!     │
//!     └──cancel──▶ Canceled
//! ```
//!
//! Booking (`schedule`) and `cancel` run synchronously through
//! [`vacation::VacationService`] and the HTTP API in [`api`].
//!
//! # Modules
//!
//! - [`types`]: ids, day amounts, statuses and records
//! - [`events`]: messages on the two topics
//! - [`lifecycle`]: pure state machine and date arithmetic
//! - [`store`]: transactional persistence (`PostgreSQL` and in-memory)
//! - [`accrual`] / [`vacation`]: the two pipelines
//! - [`api`] / [`server`]: HTTP endpoints and router
//! - [`app`]: wiring, startup and graceful shutdown
//! - [`config`]: environment configuration

pub mod accrual;
pub mod api;
pub mod app;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod server;
pub mod store;
pub mod types;
pub mod vacation;

pub use config::Config;
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
pub use types::{
    Days, Employee, EmployeeId, ReferenceMonth, VacationId, VacationSchedule, VacationStatus,
};
pub use vacation::{VacationError, VacationService};
