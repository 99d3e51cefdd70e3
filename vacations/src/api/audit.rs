//! Audit log endpoints.
//!
//! - GET /employees/:id/accruals - Accrual history, newest period first
//! - GET /vacations/:id/consumption - Consumption history, oldest first

use crate::server::state::AppState;
use crate::types::{AccrualLogEntry, ConsumptionLogEntry, EmployeeId, VacationId};
use axum::{
    Json,
    extract::{Path, State},
};
use vacation_ledger_web::WebResult;

/// Accrual history of an employee.
///
/// # Errors
///
/// 404 if the employee does not exist.
pub async fn employee_accruals(
    State(state): State<AppState>,
    Path(id): Path<EmployeeId>,
) -> WebResult<Json<Vec<AccrualLogEntry>>> {
    Ok(Json(state.vacations.accrual_history(id).await?))
}

/// Consumption history of a schedule.
///
/// # Errors
///
/// 404 if the schedule does not exist.
pub async fn vacation_consumption(
    State(state): State<AppState>,
    Path(id): Path<VacationId>,
) -> WebResult<Json<Vec<ConsumptionLogEntry>>> {
    Ok(Json(state.vacations.consumption_history(id).await?))
}
