//! In-memory ledger store.
//!
//! A transaction takes the single writer lock and works on a staged copy of
//! the ledger; commit swaps the copy in. This serializes all writers, which is
//! stricter than row locks but gives the same guarantees per entity.
//!
//! Failure injection (`fail_next_begins`, `fail_next_commits`) makes the
//! transient paths of the appliers testable without a database.

use super::{LedgerStore, LedgerTx, StoreError};
use crate::lifecycle;
use crate::types::{
    AccrualLogEntry, ConsumptionLogEntry, Days, Employee, EmployeeId, NewAccrualLogEntry,
    NewConsumptionLogEntry, NewEmployee, NewVacationSchedule, ReferenceMonth, ScheduleView,
    VacationId, VacationSchedule, VacationStatus,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use vacation_ledger_core::environment::{Clock, SystemClock};

#[derive(Debug, Clone, Default)]
struct Ledger {
    employees: BTreeMap<EmployeeId, Employee>,
    schedules: BTreeMap<VacationId, VacationSchedule>,
    accruals: Vec<AccrualLogEntry>,
    consumptions: Vec<ConsumptionLogEntry>,
    next_id: i64,
}

impl Ledger {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn view(&self, schedule: &VacationSchedule) -> Result<ScheduleView, StoreError> {
        let employee = self.employees.get(&schedule.employee_id).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "schedule {} references missing employee {}",
                schedule.id, schedule.employee_id
            ))
        })?;
        Ok(ScheduleView {
            schedule: schedule.clone(),
            employee: employee.summary(),
        })
    }
}

#[derive(Debug, Default)]
struct FailurePlan {
    begins: VecDeque<StoreError>,
    commits: VecDeque<StoreError>,
    reads: Option<StoreError>,
}

/// Ledger store held in process memory.
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    ledger: Arc<AsyncMutex<Ledger>>,
    failures: Arc<Mutex<FailurePlan>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    /// Empty store stamped with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty store stamped with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Arc::new(AsyncMutex::new(Ledger::default())),
            failures: Arc::new(Mutex::new(FailurePlan::default())),
            clock,
        }
    }

    /// Add an employee.
    pub async fn insert_employee(&self, employee: NewEmployee) -> Employee {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock().await;
        let id = EmployeeId::new(ledger.allocate_id());
        let employee = Employee {
            id,
            name: employee.name,
            email: employee.email,
            department: employee.department,
            hire_date: employee.hire_date,
            available_vacation_days: employee.available_vacation_days,
            is_active: employee.is_active,
            created_at: now,
            updated_at: now,
        };
        ledger.employees.insert(id, employee.clone());
        employee
    }

    /// Add a schedule directly in `status`, bypassing booking rules.
    pub async fn insert_schedule_with_status(
        &self,
        schedule: NewVacationSchedule,
        status: VacationStatus,
    ) -> VacationSchedule {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock().await;
        let id = VacationId::new(ledger.allocate_id());
        let schedule = VacationSchedule {
            id,
            employee_id: schedule.employee_id,
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            total_days: schedule.total_days,
            status,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };
        ledger.schedules.insert(id, schedule.clone());
        schedule
    }

    /// Every accrual entry, in insertion order.
    pub async fn accrual_entries(&self) -> Vec<AccrualLogEntry> {
        self.ledger.lock().await.accruals.clone()
    }

    /// Every consumption entry, in insertion order.
    pub async fn consumption_entries(&self) -> Vec<ConsumptionLogEntry> {
        self.ledger.lock().await.consumptions.clone()
    }

    /// Number of schedules of any status.
    pub async fn schedule_count(&self) -> usize {
        self.ledger.lock().await.schedules.len()
    }

    /// Make the next `times` calls to [`LedgerStore::begin`] fail with `error`.
    pub fn fail_next_begins(&self, times: usize, error: &StoreError) {
        let mut plan = lock(&self.failures);
        plan.begins.extend(std::iter::repeat_n(error.clone(), times));
    }

    /// Make the next `times` commits fail with `error`. The transaction is
    /// rolled back.
    pub fn fail_next_commits(&self, times: usize, error: &StoreError) {
        let mut plan = lock(&self.failures);
        plan.commits.extend(std::iter::repeat_n(error.clone(), times));
    }

    /// Make every read fail with `error` until cleared with `None`.
    pub fn fail_reads(&self, error: Option<StoreError>) {
        lock(&self.failures).reads = error;
    }

    fn check_read(&self) -> Result<(), StoreError> {
        lock(&self.failures).reads.clone().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        if let Some(error) = lock(&self.failures).begins.pop_front() {
            return Err(error);
        }
        let guard = Arc::clone(&self.ledger).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryLedgerTx {
            guard,
            staged,
            failures: Arc::clone(&self.failures),
            clock: Arc::clone(&self.clock),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_read()
    }

    async fn active_employee_ids(&self) -> Result<Vec<EmployeeId>, StoreError> {
        self.check_read()?;
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .employees
            .values()
            .filter(|e| e.is_active)
            .map(|e| e.id)
            .collect())
    }

    async fn find_employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        self.check_read()?;
        Ok(self.ledger.lock().await.employees.get(&id).cloned())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleView>, StoreError> {
        self.check_read()?;
        let ledger = self.ledger.lock().await;
        ledger.schedules.values().map(|s| ledger.view(s)).collect()
    }

    async fn find_schedule(&self, id: VacationId) -> Result<Option<ScheduleView>, StoreError> {
        self.check_read()?;
        let ledger = self.ledger.lock().await;
        ledger.schedules.get(&id).map(|s| ledger.view(s)).transpose()
    }

    async fn schedules_for_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<VacationSchedule>, StoreError> {
        self.check_read()?;
        let ledger = self.ledger.lock().await;
        let mut schedules: Vec<_> = ledger
            .schedules
            .values()
            .filter(|s| s.employee_id == employee_id)
            .cloned()
            .collect();
        schedules.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        Ok(schedules)
    }

    async fn scheduled_starting_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<VacationSchedule>, StoreError> {
        self.check_read()?;
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .schedules
            .values()
            .filter(|s| s.status == VacationStatus::Scheduled && s.start_date == date)
            .cloned()
            .collect())
    }

    async fn in_progress_ended_before(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<VacationSchedule>, StoreError> {
        self.check_read()?;
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .schedules
            .values()
            .filter(|s| s.status == VacationStatus::InProgress && s.end_date < date)
            .cloned()
            .collect())
    }

    async fn accrual_log(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<AccrualLogEntry>, StoreError> {
        self.check_read()?;
        let ledger = self.ledger.lock().await;
        let mut entries: Vec<_> = ledger
            .accruals
            .iter()
            .filter(|e| e.employee_id == employee_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.reference_month
                .cmp(&a.reference_month)
                .then(b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    async fn consumption_log(
        &self,
        vacation_id: VacationId,
    ) -> Result<Vec<ConsumptionLogEntry>, StoreError> {
        self.check_read()?;
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .consumptions
            .iter()
            .filter(|e| e.vacation_schedule_id == vacation_id)
            .cloned()
            .collect())
    }
}

struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<Ledger>,
    staged: Ledger,
    failures: Arc<Mutex<FailurePlan>>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn lock_employee(&mut self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        Ok(self.staged.employees.get(&id).cloned())
    }

    async fn lock_schedule(
        &mut self,
        id: VacationId,
    ) -> Result<Option<VacationSchedule>, StoreError> {
        Ok(self.staged.schedules.get(&id).cloned())
    }

    async fn accrual_logged(
        &mut self,
        employee_id: EmployeeId,
        month: &ReferenceMonth,
    ) -> Result<bool, StoreError> {
        Ok(self
            .staged
            .accruals
            .iter()
            .any(|e| e.employee_id == employee_id && &e.reference_month == month))
    }

    async fn set_balance(
        &mut self,
        employee_id: EmployeeId,
        balance: Days,
    ) -> Result<(), StoreError> {
        // Same bounds as `available_vacation_days NUMERIC(6,2) CHECK (>= 0)`.
        if balance < Days::ZERO || balance.value() > Decimal::new(999_999, 2) {
            return Err(StoreError::Rejected(format!(
                "balance {balance} of employee {employee_id} is out of range"
            )));
        }
        let now = self.clock.now();
        let employee = self
            .staged
            .employees
            .get_mut(&employee_id)
            .ok_or_else(|| StoreError::Database(format!("employee {employee_id} not found")))?;
        employee.available_vacation_days = balance;
        employee.updated_at = now;
        Ok(())
    }

    async fn append_accrual(
        &mut self,
        entry: NewAccrualLogEntry,
    ) -> Result<AccrualLogEntry, StoreError> {
        if self.accrual_logged(entry.employee_id, &entry.reference_month).await? {
            return Err(StoreError::Duplicate(format!(
                "accrual for employee {} in {} already logged",
                entry.employee_id, entry.reference_month
            )));
        }
        let logged = AccrualLogEntry {
            id: self.staged.allocate_id(),
            employee_id: entry.employee_id,
            days_added: entry.days_added,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            reference_month: entry.reference_month,
            processed_at: self.clock.now(),
        };
        self.staged.accruals.push(logged.clone());
        Ok(logged)
    }

    async fn open_schedules(
        &mut self,
        employee_id: EmployeeId,
    ) -> Result<Vec<VacationSchedule>, StoreError> {
        Ok(self
            .staged
            .schedules
            .values()
            .filter(|s| s.employee_id == employee_id && lifecycle::blocks_dates(s.status))
            .cloned()
            .collect())
    }

    async fn insert_schedule(
        &mut self,
        schedule: NewVacationSchedule,
    ) -> Result<VacationSchedule, StoreError> {
        let now = self.clock.now();
        let id = VacationId::new(self.staged.allocate_id());
        let schedule = VacationSchedule {
            id,
            employee_id: schedule.employee_id,
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            total_days: schedule.total_days,
            status: VacationStatus::Scheduled,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.staged.schedules.insert(id, schedule.clone());
        Ok(schedule)
    }

    async fn set_status(
        &mut self,
        id: VacationId,
        status: VacationStatus,
        cancellation_reason: Option<String>,
    ) -> Result<VacationSchedule, StoreError> {
        let now = self.clock.now();
        let schedule = self
            .staged
            .schedules
            .get_mut(&id)
            .ok_or_else(|| StoreError::Database(format!("vacation schedule {id} not found")))?;
        schedule.status = status;
        schedule.cancellation_reason = cancellation_reason;
        schedule.updated_at = now;
        Ok(schedule.clone())
    }

    async fn append_consumption(
        &mut self,
        entry: NewConsumptionLogEntry,
    ) -> Result<ConsumptionLogEntry, StoreError> {
        let logged = ConsumptionLogEntry {
            id: self.staged.allocate_id(),
            vacation_schedule_id: entry.vacation_schedule_id,
            employee_id: entry.employee_id,
            action: entry.action,
            processed_at: self.clock.now(),
        };
        self.staged.consumptions.push(logged.clone());
        Ok(logged)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if let Some(error) = lock(&this.failures).commits.pop_front() {
            return Err(error);
        }
        let mut guard = this.guard;
        *guard = this.staged;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
