//! Messages exchanged between the triggers and the appliers.
//!
//! Both are JSON records with camelCase fields. Accrual requests are keyed by
//! employee id, status changes by vacation id.

use crate::types::{Days, EmployeeId, ReferenceMonth, VacationId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default topic for accrual requests.
pub const ACCRUAL_TOPIC: &str = "vacation.accrual";

/// Default topic for vacation status changes.
pub const STATUS_TOPIC: &str = "vacation.status-update";

/// Credit `days_to_add` to an employee for `reference_month`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualRequested {
    /// Employee to credit
    pub employee_id: EmployeeId,
    /// Days to add
    pub days_to_add: Days,
    /// Dedup period, `YYYY-MM`
    pub reference_month: ReferenceMonth,
}

impl AccrualRequested {
    /// Partition key.
    #[must_use]
    pub fn key(&self) -> String {
        self.employee_id.to_string()
    }
}

/// Which boundary of a vacation was crossed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusAction {
    /// The start date has arrived
    Start,
    /// The end date has passed
    Finalize,
}

impl StatusAction {
    /// Wire form, also used as a metric label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advance a vacation across a date boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequested {
    /// Vacation to advance
    pub vacation_id: VacationId,
    /// Its employee at publish time
    pub employee_id: EmployeeId,
    /// Boundary crossed
    pub action: StatusAction,
}

impl StatusChangeRequested {
    /// Partition key.
    #[must_use]
    pub fn key(&self) -> String {
        self.vacation_id.to_string()
    }
}
