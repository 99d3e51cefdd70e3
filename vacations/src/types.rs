//! Domain types for the vacation ledger.
//!
//! Value objects (identifiers, day amounts, reference months), the persisted
//! records, and the inputs used to create them.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of an employee
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(i64);

impl EmployeeId {
    /// Wrap a raw database id
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw database id
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a vacation schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VacationId(i64);

impl VacationId {
    /// Wrap a raw database id
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw database id
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for VacationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value objects
// ============================================================================

/// A quantity of vacation days with two-decimal precision.
///
/// Every value that enters the ledger goes through [`Days::new`], which rounds
/// half away from zero to two places.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Days(Decimal);

impl Days {
    /// Zero days
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a rounded amount.
    #[must_use]
    pub fn new(value: Decimal) -> Self {
        Self(round2(value))
    }

    /// A whole number of days.
    #[must_use]
    pub fn whole(days: i64) -> Self {
        Self(Decimal::from(days))
    }

    /// The decimal value
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }

    /// Sum rounded to two places.
    #[must_use]
    pub fn plus(self, other: Self) -> Self {
        Self::new(self.0 + other.0)
    }

    /// Strictly greater than zero.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Days {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

/// Round half away from zero to two decimal places.
#[must_use]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A reference month rejected by [`ReferenceMonth::parse`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid reference month '{0}', expected YYYY-MM")]
pub struct InvalidReferenceMonth(pub String);

/// Calendar month an accrual is credited for, written `YYYY-MM`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceMonth(String);

impl ReferenceMonth {
    /// The month containing `date`.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self(format!("{:04}-{:02}", date.year(), date.month()))
    }

    /// Parse and validate a `YYYY-MM` string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidReferenceMonth`] unless the value is four digits, a dash,
    /// and a month between 01 and 12.
    pub fn parse(value: &str) -> Result<Self, InvalidReferenceMonth> {
        let invalid = || InvalidReferenceMonth(value.to_string());
        let (year, month) = value.split_once('-').ok_or_else(invalid)?;

        let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(year, 4) || !digits(month, 2) {
            return Err(invalid());
        }
        match month.parse::<u32>() {
            Ok(1..=12) => Ok(Self(value.to_string())),
            _ => Err(invalid()),
        }
    }

    /// The `YYYY-MM` text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReferenceMonth {
    type Error = InvalidReferenceMonth;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReferenceMonth> for String {
    fn from(month: ReferenceMonth) -> Self {
        month.0
    }
}

// ============================================================================
// Status vocabularies
// ============================================================================

/// A persisted status or action string that is not part of the vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'")]
pub struct UnknownVariant {
    /// Which vocabulary was being parsed
    pub kind: &'static str,
    /// The rejected value
    pub value: String,
}

/// Where a vacation schedule is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VacationStatus {
    /// Booked, not yet started
    Scheduled,
    /// Currently running
    InProgress,
    /// Ended (terminal)
    Finalized,
    /// Withdrawn before it started (terminal)
    Canceled,
}

impl VacationStatus {
    /// Persisted form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Finalized => "finalized",
            Self::Canceled => "canceled",
        }
    }

    /// No further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Canceled)
    }
}

impl fmt::Display for VacationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VacationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "in_progress" => Ok(Self::InProgress),
            "finalized" => Ok(Self::Finalized),
            "canceled" => Ok(Self::Canceled),
            other => Err(UnknownVariant {
                kind: "vacation status",
                value: other.to_string(),
            }),
        }
    }
}

/// Kind of consumption-log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionAction {
    /// The vacation began
    Started,
    /// One day of the vacation elapsed
    DayConsumed,
    /// The vacation ended
    Finalized,
}

impl ConsumptionAction {
    /// Persisted form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::DayConsumed => "day_consumed",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for ConsumptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumptionAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "day_consumed" => Ok(Self::DayConsumed),
            "finalized" => Ok(Self::Finalized),
            other => Err(UnknownVariant {
                kind: "consumption action",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// An employee and their vacation balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    /// Identifier
    pub id: EmployeeId,
    /// Full name
    pub name: String,
    /// Unique e-mail address
    pub email: String,
    /// Department
    pub department: String,
    /// Hire date
    pub hire_date: NaiveDate,
    /// Days available to book, never negative
    pub available_vacation_days: Days,
    /// Inactive employees accrue nothing
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    /// The fields shown next to a schedule.
    #[must_use]
    pub fn summary(&self) -> EmployeeSummary {
        EmployeeSummary {
            id: self.id,
            name: self.name.clone(),
            department: self.department.clone(),
        }
    }
}

/// Data needed to create an employee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEmployee {
    /// Full name
    pub name: String,
    /// Unique e-mail address
    pub email: String,
    /// Department
    pub department: String,
    /// Hire date
    pub hire_date: NaiveDate,
    /// Opening balance
    pub available_vacation_days: Days,
    /// Active flag
    pub is_active: bool,
}

/// Employee fields embedded in schedule projections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeSummary {
    /// Identifier
    pub id: EmployeeId,
    /// Full name
    pub name: String,
    /// Department
    pub department: String,
}

/// A booked vacation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VacationSchedule {
    /// Identifier
    pub id: VacationId,
    /// Who is taking the vacation
    pub employee_id: EmployeeId,
    /// First day off
    pub start_date: NaiveDate,
    /// Last day off (inclusive)
    pub end_date: NaiveDate,
    /// Inclusive day count of the range
    pub total_days: i32,
    /// Lifecycle state
    pub status: VacationStatus,
    /// Reason given when canceled
    pub cancellation_reason: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// A schedule together with its employee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    /// The schedule
    #[serde(flatten)]
    pub schedule: VacationSchedule,
    /// Its employee
    pub employee: EmployeeSummary,
}

/// Data needed to create a schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVacationSchedule {
    /// Who is taking the vacation
    pub employee_id: EmployeeId,
    /// First day off
    pub start_date: NaiveDate,
    /// Last day off (inclusive)
    pub end_date: NaiveDate,
    /// Inclusive day count
    pub total_days: i32,
}

/// One balance credit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualLogEntry {
    /// Identifier
    pub id: i64,
    /// Credited employee
    pub employee_id: EmployeeId,
    /// Amount credited
    pub days_added: Days,
    /// Balance before the credit
    pub balance_before: Days,
    /// Balance after the credit
    pub balance_after: Days,
    /// Period the credit belongs to
    pub reference_month: ReferenceMonth,
    /// When the credit was committed
    pub processed_at: DateTime<Utc>,
}

/// Data needed to append an accrual entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccrualLogEntry {
    /// Credited employee
    pub employee_id: EmployeeId,
    /// Amount credited
    pub days_added: Days,
    /// Balance before the credit
    pub balance_before: Days,
    /// Balance after the credit
    pub balance_after: Days,
    /// Period the credit belongs to
    pub reference_month: ReferenceMonth,
}

/// One lifecycle step of a schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionLogEntry {
    /// Identifier
    pub id: i64,
    /// Schedule the step belongs to
    pub vacation_schedule_id: VacationId,
    /// Employee on vacation
    pub employee_id: EmployeeId,
    /// What happened
    pub action: ConsumptionAction,
    /// When it was recorded
    pub processed_at: DateTime<Utc>,
}

/// Data needed to append a consumption entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewConsumptionLogEntry {
    /// Schedule the step belongs to
    pub vacation_schedule_id: VacationId,
    /// Employee on vacation
    pub employee_id: EmployeeId,
    /// What happened
    pub action: ConsumptionAction,
}
