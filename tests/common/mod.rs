#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use mtmcoach::domain::error::CoachError;
use mtmcoach::domain::progress::{Enrollment, EnrollmentStatus, TaskProgress};
use mtmcoach::domain::task::{Task, TaskLevel};
use mtmcoach::domain::trade::{Trade, OPEN_OUTCOME};
use mtmcoach::ports::catalog_port::CatalogPort;
use mtmcoach::ports::ledger_port::LedgerPort;
use mtmcoach::ports::progress_port::ProgressPort;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn as_of() -> NaiveDate {
    date(2024, 6, 28)
}

pub fn make_task(id: i64, model_id: i64, rules_json: &str) -> Task {
    Task {
        id,
        model_id,
        title: format!("Task {id}"),
        level: TaskLevel::Moderate,
        display_order: id,
        rules_json: rules_json.into(),
        advanced_json: None,
    }
}

pub fn closed_trade(id: i64, user_id: i64, exit: NaiveDate) -> Trade {
    Trade {
        id,
        user_id,
        symbol: "BHP".into(),
        entry_price: 100.0,
        stop_loss: Some(95.0),
        target_price: Some(110.0),
        exit_price: Some(104.0),
        outcome: "WIN".into(),
        entry_date: exit - Duration::days(2),
        exit_date: Some(exit),
        position_percent: Some(5.0),
        analysis_link: Some("https://notes.example/t/1".into()),
    }
}

pub fn open_trade(id: i64, user_id: i64, entry: NaiveDate) -> Trade {
    Trade {
        outcome: OPEN_OUTCOME.into(),
        exit_price: None,
        exit_date: None,
        entry_date: entry,
        ..closed_trade(id, user_id, entry)
    }
}

pub fn enrollment(user_id: i64, model_id: i64, status: EnrollmentStatus, pct: u8) -> Enrollment {
    Enrollment {
        user_id,
        model_id,
        status,
        progress_pct: pct,
    }
}

pub struct MockCatalog {
    pub models: Vec<i64>,
    pub tasks: Vec<Task>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn with_model(mut self, model_id: i64) -> Self {
        self.models.push(model_id);
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        if !self.models.contains(&task.model_id) {
            self.models.push(task.model_id);
        }
        self.tasks.push(task);
        self
    }
}

impl CatalogPort for MockCatalog {
    fn model_exists(&self, model_id: i64) -> Result<bool, CoachError> {
        Ok(self.models.contains(&model_id))
    }

    fn get_task(&self, task_id: i64) -> Result<Option<Task>, CoachError> {
        Ok(self.tasks.iter().find(|t| t.id == task_id).cloned())
    }

    fn list_tasks(&self, model_id: i64) -> Result<Vec<Task>, CoachError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.model_id == model_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.display_order, t.id));
        Ok(tasks)
    }
}

pub struct MockLedger {
    pub trades: HashMap<i64, Vec<Trade>>,
    pub errors: HashMap<i64, String>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            trades: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_trades(mut self, user_id: i64, trades: Vec<Trade>) -> Self {
        self.trades.insert(user_id, trades);
        self
    }

    pub fn with_error(mut self, user_id: i64, reason: &str) -> Self {
        self.errors.insert(user_id, reason.to_string());
        self
    }
}

impl LedgerPort for MockLedger {
    fn trades_for_user(&self, user_id: i64) -> Result<Vec<Trade>, CoachError> {
        if let Some(reason) = self.errors.get(&user_id) {
            return Err(CoachError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self.trades.get(&user_id).cloned().unwrap_or_default())
    }
}

/// In-memory progress store. Single-threaded by design; tests drive the
/// orchestrator synchronously.
pub struct MemoryProgress {
    pub provisioned: bool,
    pub fail_save: Cell<bool>,
    pub rows: RefCell<HashMap<(i64, i64), TaskProgress>>,
    pub enrollments: RefCell<HashMap<(i64, i64), Enrollment>>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self {
            provisioned: true,
            fail_save: Cell::new(false),
            rows: RefCell::new(HashMap::new()),
            enrollments: RefCell::new(HashMap::new()),
        }
    }

    pub fn unprovisioned() -> Self {
        Self {
            provisioned: false,
            ..Self::new()
        }
    }

    pub fn with_enrollment(self, enrollment: Enrollment) -> Self {
        self.enrollments
            .borrow_mut()
            .insert((enrollment.user_id, enrollment.model_id), enrollment);
        self
    }

    pub fn row(&self, user_id: i64, task_id: i64) -> Option<TaskProgress> {
        self.rows.borrow().get(&(user_id, task_id)).cloned()
    }

    pub fn enrollment_of(&self, user_id: i64, model_id: i64) -> Option<Enrollment> {
        self.enrollments
            .borrow()
            .get(&(user_id, model_id))
            .cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.borrow().len()
    }
}

impl ProgressPort for MemoryProgress {
    fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    fn progress_for(&self, user_id: i64, _model_id: i64) -> Result<Vec<TaskProgress>, CoachError> {
        Ok(self
            .rows
            .borrow()
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    fn get_enrollment(
        &self,
        user_id: i64,
        model_id: i64,
    ) -> Result<Option<Enrollment>, CoachError> {
        Ok(self.enrollment_of(user_id, model_id))
    }

    fn active_enrollments(
        &self,
        model_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Enrollment>, CoachError> {
        let mut matching: Vec<Enrollment> = self
            .enrollments
            .borrow()
            .values()
            .filter(|e| e.model_id == model_id && e.status.reconcilable())
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.user_id);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    fn save_user_outcome(
        &self,
        rows: &[TaskProgress],
        enrollment: Option<&Enrollment>,
    ) -> Result<(), CoachError> {
        if !self.provisioned {
            return Err(CoachError::StorageUnavailable {
                reason: "progress tables are not provisioned".into(),
            });
        }
        if self.fail_save.get() {
            return Err(CoachError::Persistence {
                reason: "disk full".into(),
            });
        }
        let mut stored = self.rows.borrow_mut();
        for row in rows {
            stored.insert((row.user_id, row.task_id), row.clone());
        }
        if let Some(e) = enrollment {
            self.enrollments
                .borrow_mut()
                .insert((e.user_id, e.model_id), e.clone());
        }
        Ok(())
    }
}
