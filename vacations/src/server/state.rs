//! Application state for the vacation HTTP server.

use crate::vacation::VacationService;
use axum::extract::FromRef;
use std::sync::Arc;
use vacation_ledger_web::ReadinessProbe;

/// State shared across all HTTP handlers. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Booking lifecycle and read queries
    pub vacations: VacationService,

    /// Dependency check behind `/ready`
    pub readiness: Arc<dyn ReadinessProbe>,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub fn new(vacations: VacationService, readiness: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            vacations,
            readiness,
        }
    }
}

impl FromRef<AppState> for Arc<dyn ReadinessProbe> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.readiness)
    }
}
