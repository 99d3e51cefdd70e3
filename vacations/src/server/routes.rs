//! Router configuration.

use super::state::AppState;
use crate::api::{audit, vacations};
use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use vacation_ledger_web::{health, log_requests};

/// Build the complete Axum router.
///
/// # Routes
///
/// - `GET /health`, `GET /ready`
/// - `POST /vacations/schedule`
/// - `PATCH /vacations/:id/cancel`
/// - `GET /vacations`, `GET /vacations/:id`, `GET /vacations/employee/:employee_id`
/// - `GET /vacations/:id/consumption`
/// - `GET /employees/:id/accruals`
pub fn build_router(state: AppState) -> Router {
    let vacation_routes = Router::new()
        .route("/", get(vacations::list_vacations))
        .route("/schedule", post(vacations::schedule_vacation))
        .route("/employee/:employee_id", get(vacations::list_employee_vacations))
        .route("/:id", get(vacations::get_vacation))
        .route("/:id/cancel", patch(vacations::cancel_vacation))
        .route("/:id/consumption", get(audit::vacation_consumption));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/employees/:id/accruals", get(audit::employee_accruals))
        .nest("/vacations", vacation_routes)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}
