//! Vacation endpoints.
//!
//! - POST /vacations/schedule - Book a vacation
//! - PATCH /vacations/:id/cancel - Cancel a Scheduled vacation
//! - GET /vacations - Every schedule with its employee
//! - GET /vacations/employee/:employee_id - Schedules of one employee
//! - GET /vacations/:id - One schedule with its employee

use crate::server::state::AppState;
use crate::types::{EmployeeId, ScheduleView, VacationId, VacationSchedule};
use crate::vacation::ScheduleRequest;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use vacation_ledger_web::{OptionalJson, ValidJson, WebResult};

/// Body of a cancellation. May be omitted entirely.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    /// Free-text reason, at most 255 characters
    pub reason: Option<String>,
}

/// Book a vacation.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:3000/vacations/schedule \
///   -H "Content-Type: application/json" \
///   -d '{"employeeId": 1, "startDate": "2024-03-01", "endDate": "2024-03-05"}'
/// ```
///
/// # Errors
///
/// - 400 `INVALID_BODY` if the body is not a valid request
/// - 404 if the employee does not exist
/// - 400 `INVALID_RANGE` / `OVERLAP`
/// - 422 `INSUFFICIENT_BALANCE`
pub async fn schedule_vacation(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<ScheduleRequest>,
) -> WebResult<(StatusCode, Json<VacationSchedule>)> {
    let schedule = state.vacations.schedule(request).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Cancel a vacation that has not started.
///
/// # Errors
///
/// - 404 if the schedule does not exist
/// - 400 `ILLEGAL_TRANSITION` unless the schedule is Scheduled
/// - 400 `INVALID_REASON` if the reason is too long
/// - 400 `INVALID_BODY` if a body is sent but is not a valid request
pub async fn cancel_vacation(
    State(state): State<AppState>,
    Path(id): Path<VacationId>,
    OptionalJson(body): OptionalJson<CancelRequest>,
) -> WebResult<Json<VacationSchedule>> {
    let request = body.unwrap_or_default();
    let schedule = state.vacations.cancel(id, request.reason).await?;
    Ok(Json(schedule))
}

/// List every schedule.
///
/// # Errors
///
/// 500 / 503 if the store fails.
pub async fn list_vacations(State(state): State<AppState>) -> WebResult<Json<Vec<ScheduleView>>> {
    Ok(Json(state.vacations.find_all().await?))
}

/// List the schedules of one employee, latest start first.
///
/// # Errors
///
/// 500 / 503 if the store fails.
pub async fn list_employee_vacations(
    State(state): State<AppState>,
    Path(employee_id): Path<EmployeeId>,
) -> WebResult<Json<Vec<VacationSchedule>>> {
    Ok(Json(state.vacations.find_by_employee(employee_id).await?))
}

/// Fetch one schedule.
///
/// # Errors
///
/// 404 if the schedule does not exist.
pub async fn get_vacation(
    State(state): State<AppState>,
    Path(id): Path<VacationId>,
) -> WebResult<Json<ScheduleView>> {
    Ok(Json(state.vacations.find_one(id).await?))
}
