//! HTTP endpoints.
//!
//! - `vacations`: booking, cancellation and schedule queries
//! - `audit`: accrual and consumption history

pub mod audit;
pub mod vacations;

use crate::store::StoreError;
use crate::vacation::VacationError;
use vacation_ledger_web::AppError;

impl From<VacationError> for AppError {
    fn from(err: VacationError) -> Self {
        let message = err.to_string();
        match err {
            VacationError::EmployeeNotFound(id) => Self::not_found("Employee", id),
            VacationError::VacationNotFound(id) => Self::not_found("Vacation schedule", id),
            VacationError::InvalidRange(_) => Self::bad_request("INVALID_RANGE", message),
            VacationError::InvalidReason { .. } => Self::bad_request("INVALID_REASON", message),
            VacationError::Overlap(_) => Self::bad_request("OVERLAP", message),
            VacationError::IllegalTransition(_) => Self::bad_request("ILLEGAL_TRANSITION", message),
            VacationError::InsufficientBalance { .. } => {
                Self::unprocessable("INSUFFICIENT_BALANCE", message)
            }
            VacationError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::unavailable("The store is temporarily unavailable").with_source(err.into())
        } else {
            Self::internal("An internal error occurred").with_source(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{IllegalTransition, Transition};
    use crate::types::{EmployeeId, VacationId, VacationStatus};
    use axum::http::StatusCode;

    #[test]
    fn domain_errors_map_to_status_and_code() {
        let cases = [
            (
                VacationError::EmployeeNotFound(EmployeeId::new(7)),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                VacationError::Overlap(VacationId::new(3)),
                StatusCode::BAD_REQUEST,
                "OVERLAP",
            ),
            (
                VacationError::IllegalTransition(IllegalTransition {
                    from: VacationStatus::Finalized,
                    transition: Transition::Cancel,
                }),
                StatusCode::BAD_REQUEST,
                "ILLEGAL_TRANSITION",
            ),
            (
                VacationError::InsufficientBalance {
                    requested: 9,
                    available: "8.75".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_BALANCE",
            ),
            (
                VacationError::Store(StoreError::LockTimeout("row".into())),
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
            ),
            (
                VacationError::Store(StoreError::Corrupt("status".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }
}
