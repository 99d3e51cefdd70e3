//! Synchronous vacation operations.
//!
//! `schedule` and `cancel` each run in one transaction and either commit or
//! leave the store untouched. Scheduling checks the balance but does not
//! reserve it: two bookings may both pass against the same balance.

use super::VacationError;
use crate::lifecycle::{self, DateRange, InvalidRange, Transition};
use crate::metrics::TransitionMetrics;
use crate::store::LedgerStore;
use crate::types::{
    AccrualLogEntry, ConsumptionLogEntry, EmployeeId, NewVacationSchedule, ScheduleView,
    VacationId, VacationSchedule,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Longest cancellation reason the store accepts.
pub const MAX_REASON_LENGTH: usize = 255;

/// Booking request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    /// Who is booking
    pub employee_id: EmployeeId,
    /// First day off
    pub start_date: NaiveDate,
    /// Last day off (inclusive)
    pub end_date: NaiveDate,
}

/// Booking lifecycle manager.
#[derive(Clone)]
pub struct VacationService {
    store: Arc<dyn LedgerStore>,
}

impl VacationService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Book a vacation.
    ///
    /// The employee row is locked for the duration of the checks so that two
    /// bookings for the same employee are evaluated one after the other.
    ///
    /// # Errors
    ///
    /// - [`VacationError::EmployeeNotFound`]
    /// - [`VacationError::InvalidRange`] if `end_date <= start_date`
    /// - [`VacationError::InsufficientBalance`] if the day count exceeds the balance
    /// - [`VacationError::Overlap`] if an open schedule shares a day
    /// - [`VacationError::Store`]
    pub async fn schedule(
        &self,
        request: ScheduleRequest,
    ) -> Result<VacationSchedule, VacationError> {
        let mut tx = self.store.begin().await?;

        let employee = tx
            .lock_employee(request.employee_id)
            .await?
            .ok_or(VacationError::EmployeeNotFound(request.employee_id))?;

        let range = DateRange::new(request.start_date, request.end_date)?;
        let total_days = range.total_days();

        if !lifecycle::has_sufficient_balance(total_days, employee.available_vacation_days) {
            return Err(VacationError::InsufficientBalance {
                requested: total_days,
                available: employee.available_vacation_days.to_string(),
            });
        }

        let open = tx.open_schedules(employee.id).await?;
        if let Some(existing) = open.iter().find(|s| {
            lifecycle::blocks_dates(s.status)
                && DateRange::stored(s.start_date, s.end_date).overlaps(&range)
        }) {
            return Err(VacationError::Overlap(existing.id));
        }

        let total_days = i32::try_from(total_days).map_err(|_| InvalidRange {
            start: request.start_date,
            end: request.end_date,
        })?;

        let schedule = tx
            .insert_schedule(NewVacationSchedule {
                employee_id: employee.id,
                start_date: range.start(),
                end_date: range.end(),
                total_days,
            })
            .await?;
        tx.commit().await?;

        info!(
            vacation_id = %schedule.id,
            employee_id = %schedule.employee_id,
            start_date = %schedule.start_date,
            end_date = %schedule.end_date,
            total_days = schedule.total_days,
            "Vacation scheduled"
        );
        Ok(schedule)
    }

    /// Cancel a vacation that has not started.
    ///
    /// # Errors
    ///
    /// - [`VacationError::InvalidReason`] if `reason` is too long
    /// - [`VacationError::VacationNotFound`]
    /// - [`VacationError::IllegalTransition`] unless the schedule is Scheduled
    /// - [`VacationError::Store`]
    pub async fn cancel(
        &self,
        id: VacationId,
        reason: Option<String>,
    ) -> Result<VacationSchedule, VacationError> {
        if let Some(reason) = &reason {
            let actual = reason.chars().count();
            if actual > MAX_REASON_LENGTH {
                return Err(VacationError::InvalidReason {
                    max: MAX_REASON_LENGTH,
                    actual,
                });
            }
        }

        let mut tx = self.store.begin().await?;
        let schedule = tx
            .lock_schedule(id)
            .await?
            .ok_or(VacationError::VacationNotFound(id))?;

        let status = lifecycle::next_status(schedule.status, Transition::Cancel)?;
        let canceled = tx.set_status(id, status, reason).await?;
        tx.commit().await?;

        TransitionMetrics::record_applied(Transition::Cancel.as_str());
        info!(
            vacation_id = %id,
            employee_id = %canceled.employee_id,
            reason = canceled.cancellation_reason.as_deref().unwrap_or(""),
            "Vacation canceled"
        );
        Ok(canceled)
    }

    /// Every schedule with its employee.
    ///
    /// # Errors
    ///
    /// Returns [`VacationError::Store`] if the query fails.
    pub async fn find_all(&self) -> Result<Vec<ScheduleView>, VacationError> {
        Ok(self.store.list_schedules().await?)
    }

    /// Schedules of one employee, latest start first. Unknown employees have none.
    ///
    /// # Errors
    ///
    /// Returns [`VacationError::Store`] if the query fails.
    pub async fn find_by_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<VacationSchedule>, VacationError> {
        Ok(self.store.schedules_for_employee(employee_id).await?)
    }

    /// One schedule with its employee.
    ///
    /// # Errors
    ///
    /// Returns [`VacationError::VacationNotFound`] if absent.
    pub async fn find_one(&self, id: VacationId) -> Result<ScheduleView, VacationError> {
        self.store
            .find_schedule(id)
            .await?
            .ok_or(VacationError::VacationNotFound(id))
    }

    /// Accrual history of an employee, newest period first.
    ///
    /// # Errors
    ///
    /// Returns [`VacationError::EmployeeNotFound`] if absent.
    pub async fn accrual_history(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<AccrualLogEntry>, VacationError> {
        if self.store.find_employee(employee_id).await?.is_none() {
            return Err(VacationError::EmployeeNotFound(employee_id));
        }
        Ok(self.store.accrual_log(employee_id).await?)
    }

    /// Consumption history of a schedule, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`VacationError::VacationNotFound`] if absent.
    pub async fn consumption_history(
        &self,
        id: VacationId,
    ) -> Result<Vec<ConsumptionLogEntry>, VacationError> {
        self.find_one(id).await?;
        Ok(self.store.consumption_log(id).await?)
    }
}
