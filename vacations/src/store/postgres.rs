//! `PostgreSQL` ledger store.
//!
//! Every transaction sets `lock_timeout` locally, so a `FOR UPDATE` that waits
//! too long fails with SQLSTATE 55P03 and surfaces as
//! [`StoreError::LockTimeout`] instead of blocking the consumer.

use super::{LedgerStore, LedgerTx, StoreError};
use crate::types::{
    AccrualLogEntry, ConsumptionLogEntry, Days, Employee, EmployeeId, EmployeeSummary,
    NewAccrualLogEntry, NewConsumptionLogEntry, NewEmployee, NewVacationSchedule, ReferenceMonth,
    ScheduleView, VacationId, VacationSchedule, VacationStatus,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use vacation_ledger_postgres::{DbErrorKind, classify};

const EMPLOYEE_COLUMNS: &str = "id, name, email, department, hire_date, \
     available_vacation_days, is_active, created_at, updated_at";

const SCHEDULE_COLUMNS: &str = "id, employee_id, start_date, end_date, total_days, \
     status, cancellation_reason, created_at, updated_at";

const SCHEDULE_VIEW_SELECT: &str = "SELECT s.id, s.employee_id, s.start_date, s.end_date, \
     s.total_days, s.status, s.cancellation_reason, s.created_at, s.updated_at, \
     e.name AS employee_name, e.department AS employee_department \
     FROM vacation_schedules s JOIN employees e ON e.id = s.employee_id";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        match classify(&err) {
            DbErrorKind::LockTimeout => Self::LockTimeout(message),
            DbErrorKind::Serialization => Self::Serialization(message),
            DbErrorKind::UniqueViolation => Self::Duplicate(message),
            DbErrorKind::DataRejected => Self::Rejected(message),
            DbErrorKind::Unavailable => Self::Unavailable(message),
            DbErrorKind::Decode => Self::Corrupt(message),
            DbErrorKind::Other => Self::Database(message),
        }
    }
}

/// Ledger store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    /// Create a store. `lock_timeout` bounds every row lock wait.
    #[must_use]
    pub const fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert an employee. Used by seeding and tests; the ledger itself never
    /// creates employees.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the e-mail is taken.
    pub async fn insert_employee(&self, employee: &NewEmployee) -> Result<Employee, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO employees \
                 (name, email, department, hire_date, available_vacation_days, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {EMPLOYEE_COLUMNS}"
        ))
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(&employee.department)
        .bind(employee.hire_date)
        .bind(employee.available_vacation_days.value())
        .bind(employee.is_active)
        .fetch_one(&self.pool)
        .await?;

        employee_from_row(&row)
    }

    fn lock_timeout_setting(&self) -> String {
        format!("{}ms", self.lock_timeout.as_millis())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(self.lock_timeout_setting())
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PostgresLedgerTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn active_employee_ids(&self) -> Result<Vec<EmployeeId>, StoreError> {
        let ids: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM employees WHERE is_active ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(|(id,)| EmployeeId::new(id)).collect())
    }

    async fn find_employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(employee_from_row).transpose()
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleView>, StoreError> {
        let rows = sqlx::query(&format!("{SCHEDULE_VIEW_SELECT} ORDER BY s.id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(view_from_row).collect()
    }

    async fn find_schedule(&self, id: VacationId) -> Result<Option<ScheduleView>, StoreError> {
        let row = sqlx::query(&format!("{SCHEDULE_VIEW_SELECT} WHERE s.id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(view_from_row).transpose()
    }

    async fn schedules_for_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<VacationSchedule>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM vacation_schedules \
             WHERE employee_id = $1 ORDER BY start_date DESC, id DESC"
        ))
        .bind(employee_id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn scheduled_starting_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<VacationSchedule>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM vacation_schedules \
             WHERE status = $1 AND start_date = $2 ORDER BY id"
        ))
        .bind(VacationStatus::Scheduled.as_str())
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn in_progress_ended_before(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<VacationSchedule>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM vacation_schedules \
             WHERE status = $1 AND end_date < $2 ORDER BY id"
        ))
        .bind(VacationStatus::InProgress.as_str())
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn accrual_log(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<AccrualLogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, employee_id, days_added, balance_before, balance_after, \
                    reference_month, processed_at \
             FROM vacation_accrual_logs \
             WHERE employee_id = $1 ORDER BY reference_month DESC, id DESC",
        )
        .bind(employee_id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(accrual_from_row).collect()
    }

    async fn consumption_log(
        &self,
        vacation_id: VacationId,
    ) -> Result<Vec<ConsumptionLogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, vacation_schedule_id, employee_id, action, processed_at \
             FROM vacation_consumption_logs \
             WHERE vacation_schedule_id = $1 ORDER BY processed_at, id",
        )
        .bind(vacation_id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(consumption_from_row).collect()
    }
}

struct PostgresLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn lock_employee(&mut self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(employee_from_row).transpose()
    }

    async fn lock_schedule(
        &mut self,
        id: VacationId,
    ) -> Result<Option<VacationSchedule>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM vacation_schedules WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn accrual_logged(
        &mut self,
        employee_id: EmployeeId,
        month: &ReferenceMonth,
    ) -> Result<bool, StoreError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS ( \
                 SELECT 1 FROM vacation_accrual_logs \
                 WHERE employee_id = $1 AND reference_month = $2)",
        )
        .bind(employee_id.get())
        .bind(month.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn set_balance(
        &mut self,
        employee_id: EmployeeId,
        balance: Days,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE employees SET available_vacation_days = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(employee_id.get())
        .bind(balance.value())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_accrual(
        &mut self,
        entry: NewAccrualLogEntry,
    ) -> Result<AccrualLogEntry, StoreError> {
        let row = sqlx::query(
            "INSERT INTO vacation_accrual_logs \
                 (employee_id, days_added, balance_before, balance_after, reference_month) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, employee_id, days_added, balance_before, balance_after, \
                       reference_month, processed_at",
        )
        .bind(entry.employee_id.get())
        .bind(entry.days_added.value())
        .bind(entry.balance_before.value())
        .bind(entry.balance_after.value())
        .bind(entry.reference_month.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        accrual_from_row(&row)
    }

    async fn open_schedules(
        &mut self,
        employee_id: EmployeeId,
    ) -> Result<Vec<VacationSchedule>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM vacation_schedules \
             WHERE employee_id = $1 AND status IN ($2, $3) ORDER BY start_date"
        ))
        .bind(employee_id.get())
        .bind(VacationStatus::Scheduled.as_str())
        .bind(VacationStatus::InProgress.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn insert_schedule(
        &mut self,
        schedule: NewVacationSchedule,
    ) -> Result<VacationSchedule, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO vacation_schedules (employee_id, start_date, end_date, total_days, status) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(schedule.employee_id.get())
        .bind(schedule.start_date)
        .bind(schedule.end_date)
        .bind(schedule.total_days)
        .bind(VacationStatus::Scheduled.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        schedule_from_row(&row)
    }

    async fn set_status(
        &mut self,
        id: VacationId,
        status: VacationStatus,
        cancellation_reason: Option<String>,
    ) -> Result<VacationSchedule, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE vacation_schedules \
             SET status = $2, cancellation_reason = $3, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(id.get())
        .bind(status.as_str())
        .bind(cancellation_reason)
        .fetch_one(&mut *self.tx)
        .await?;
        schedule_from_row(&row)
    }

    async fn append_consumption(
        &mut self,
        entry: NewConsumptionLogEntry,
    ) -> Result<ConsumptionLogEntry, StoreError> {
        let row = sqlx::query(
            "INSERT INTO vacation_consumption_logs (vacation_schedule_id, employee_id, action) \
             VALUES ($1, $2, $3) \
             RETURNING id, vacation_schedule_id, employee_id, action, processed_at",
        )
        .bind(entry.vacation_schedule_id.get())
        .bind(entry.employee_id.get())
        .bind(entry.action.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        consumption_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn employee_from_row(row: &PgRow) -> Result<Employee, StoreError> {
    Ok(Employee {
        id: EmployeeId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        department: row.try_get("department")?,
        hire_date: row.try_get("hire_date")?,
        available_vacation_days: Days::new(row.try_get::<Decimal, _>("available_vacation_days")?),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn schedule_from_row(row: &PgRow) -> Result<VacationSchedule, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(VacationSchedule {
        id: VacationId::new(row.try_get("id")?),
        employee_id: EmployeeId::new(row.try_get("employee_id")?),
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        total_days: row.try_get("total_days")?,
        status: status
            .parse()
            .map_err(|e: crate::types::UnknownVariant| StoreError::Corrupt(e.to_string()))?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn view_from_row(row: &PgRow) -> Result<ScheduleView, StoreError> {
    let schedule = schedule_from_row(row)?;
    Ok(ScheduleView {
        employee: EmployeeSummary {
            id: schedule.employee_id,
            name: row.try_get("employee_name")?,
            department: row.try_get("employee_department")?,
        },
        schedule,
    })
}

fn accrual_from_row(row: &PgRow) -> Result<AccrualLogEntry, StoreError> {
    let month: String = row.try_get("reference_month")?;
    Ok(AccrualLogEntry {
        id: row.try_get("id")?,
        employee_id: EmployeeId::new(row.try_get("employee_id")?),
        days_added: Days::new(row.try_get::<Decimal, _>("days_added")?),
        balance_before: Days::new(row.try_get::<Decimal, _>("balance_before")?),
        balance_after: Days::new(row.try_get::<Decimal, _>("balance_after")?),
        reference_month: ReferenceMonth::parse(month.trim())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn consumption_from_row(row: &PgRow) -> Result<ConsumptionLogEntry, StoreError> {
    let action: String = row.try_get("action")?;
    Ok(ConsumptionLogEntry {
        id: row.try_get("id")?,
        vacation_schedule_id: VacationId::new(row.try_get("vacation_schedule_id")?),
        employee_id: EmployeeId::new(row.try_get("employee_id")?),
        action: action
            .parse()
            .map_err(|e: crate::types::UnknownVariant| StoreError::Corrupt(e.to_string()))?,
        processed_at: row.try_get("processed_at")?,
    })
}
