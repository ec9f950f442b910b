//! Verification orchestrator.
//!
//! Single entry point for the three run shapes: preview (evaluate only),
//! run (evaluate and persist for one user), and recalc-all (administrative
//! batch over every active/completed enrollment of a model). Authorization
//! is checked before any evaluation happens.

use crate::domain::error::CoachError;
use crate::domain::evaluate::{evaluate, EvaluationResult};
use crate::domain::progress::{Enrollment, ProgressStatus, TaskProgress};
use crate::domain::task::Task;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::ports::catalog_port::CatalogPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::progress_port::ProgressPort;

/// Enrollment pages fetched per round trip during recalc-all.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
}

/// Caller identity and role, supplied by the session layer.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Preview,
    Run,
}

#[derive(Debug, Clone, Copy)]
pub enum Scope {
    Task(i64),
    Model(i64),
}

/// Outcome of one user's verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub user_id: i64,
    pub model_id: i64,
    pub results: Vec<EvaluationResult>,
    /// True when progress storage is unprovisioned; nothing was written.
    pub dry_run: bool,
    pub saved: bool,
    pub save_error: Option<String>,
    /// The reconciled enrollment, when one was updated.
    pub enrollment: Option<Enrollment>,
}

impl VerifyReport {
    /// Human-readable one-liner for the interactive response shape.
    pub fn summary(&self) -> String {
        let passed = self.results.iter().filter(|r| r.passed).count();
        let mut summary = format!("{passed} of {} tasks passed", self.results.len());
        if let Some(e) = &self.enrollment {
            summary.push_str(&format!(", progress {}% ({})", e.progress_pct, e.status.as_str()));
        }
        if self.dry_run {
            summary.push_str(" [dry run, nothing saved]");
        } else if !self.saved {
            summary.push_str(" [not saved]");
        }
        summary
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum UserOutcome {
    Verified(VerifyReport),
    Failed { user_id: i64, reason: String },
}

/// Result of an administrative recalc-all run.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub model_id: i64,
    pub users: Vec<UserOutcome>,
    pub dry_run: bool,
}

pub struct Orchestrator<'a> {
    catalog: &'a dyn CatalogPort,
    ledger: &'a dyn LedgerPort,
    progress: &'a dyn ProgressPort,
    chunk_size: usize,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        catalog: &'a dyn CatalogPort,
        ledger: &'a dyn LedgerPort,
        progress: &'a dyn ProgressPort,
    ) -> Self {
        Orchestrator {
            catalog,
            ledger,
            progress,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Evaluate one user against a task or a whole model.
    pub fn verify(
        &self,
        actor: &Actor,
        target_user_id: i64,
        scope: Scope,
        mode: Mode,
        as_of: NaiveDate,
    ) -> Result<VerifyReport, CoachError> {
        if target_user_id != actor.user_id && actor.role != Role::Admin {
            return Err(CoachError::Authorization {
                reason: format!(
                    "user {} may not verify user {target_user_id}",
                    actor.user_id
                ),
            });
        }
        self.verify_user(target_user_id, scope, mode, as_of)
    }

    /// Re-verify every user with an active or completed enrollment in the
    /// model. Per-user failures are collected into the report; one user's
    /// failure never aborts the rest of the batch.
    pub fn recalc_all(
        &self,
        actor: &Actor,
        model_id: i64,
        as_of: NaiveDate,
    ) -> Result<BatchReport, CoachError> {
        if actor.role != Role::Admin {
            return Err(CoachError::Authorization {
                reason: "recalc-all requires an administrator".into(),
            });
        }
        if !self.catalog.model_exists(model_id)? {
            return Err(CoachError::ModelNotFound { model_id });
        }

        let mut users = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .progress
                .active_enrollments(model_id, self.chunk_size, offset)?;
            let fetched = page.len();

            for enrollment in page {
                let outcome = match self.verify_user(
                    enrollment.user_id,
                    Scope::Model(model_id),
                    Mode::Run,
                    as_of,
                ) {
                    Ok(report) => UserOutcome::Verified(report),
                    Err(err) => UserOutcome::Failed {
                        user_id: enrollment.user_id,
                        reason: err.to_string(),
                    },
                };
                users.push(outcome);
            }

            if fetched < self.chunk_size {
                break;
            }
            offset += fetched;
        }

        Ok(BatchReport {
            model_id,
            users,
            dry_run: !self.progress.is_provisioned(),
        })
    }

    fn verify_user(
        &self,
        user_id: i64,
        scope: Scope,
        mode: Mode,
        as_of: NaiveDate,
    ) -> Result<VerifyReport, CoachError> {
        let (model_id, scoped_tasks, all_tasks) = self.load_scope(scope)?;

        let trades = self.ledger.trades_for_user(user_id)?;
        let results: Vec<EvaluationResult> = scoped_tasks
            .iter()
            .map(|task| evaluate(task, &trades, as_of))
            .collect();

        let dry_run = !self.progress.is_provisioned();
        if mode == Mode::Preview || dry_run {
            return Ok(VerifyReport {
                user_id,
                model_id,
                results,
                dry_run,
                saved: false,
                save_error: None,
                enrollment: None,
            });
        }

        // Results with a rule-set diagnostic are surfaced but never written.
        let checked_at = Utc::now();
        let rows: Vec<TaskProgress> = results
            .iter()
            .filter(|r| r.persistable())
            .map(|r| TaskProgress::from_result(user_id, r, checked_at))
            .collect::<Result<_, _>>()?;

        let enrollment = self.reconcile_enrollment(user_id, model_id, &all_tasks, &rows)?;

        let (saved, save_error) = match self.progress.save_user_outcome(&rows, enrollment.as_ref())
        {
            Ok(()) => (true, None),
            Err(CoachError::Persistence { reason }) => (false, Some(reason)),
            Err(other) => return Err(other),
        };

        Ok(VerifyReport {
            user_id,
            model_id,
            results,
            dry_run: false,
            saved,
            save_error,
            enrollment,
        })
    }

    fn load_scope(&self, scope: Scope) -> Result<(i64, Vec<Task>, Vec<Task>), CoachError> {
        match scope {
            Scope::Task(task_id) => {
                let task = self
                    .catalog
                    .get_task(task_id)?
                    .ok_or(CoachError::TaskNotFound { task_id })?;
                let model_id = task.model_id;
                let all_tasks = self.catalog.list_tasks(model_id)?;
                Ok((model_id, vec![task], all_tasks))
            }
            Scope::Model(model_id) => {
                if !self.catalog.model_exists(model_id)? {
                    return Err(CoachError::ModelNotFound { model_id });
                }
                let all_tasks = self.catalog.list_tasks(model_id)?;
                Ok((model_id, all_tasks.clone(), all_tasks))
            }
        }
    }

    /// Recompute the enrollment aggregate from what the progress rows will
    /// look like after this run's writes: stored statuses overlaid with the
    /// fresh rows.
    fn reconcile_enrollment(
        &self,
        user_id: i64,
        model_id: i64,
        all_tasks: &[Task],
        fresh_rows: &[TaskProgress],
    ) -> Result<Option<Enrollment>, CoachError> {
        let current = match self.progress.get_enrollment(user_id, model_id)? {
            Some(e) if e.status.reconcilable() => e,
            _ => return Ok(None),
        };

        let stored = self.progress.progress_for(user_id, model_id)?;
        let mut completed: HashSet<i64> = stored
            .iter()
            .filter(|row| row.status == ProgressStatus::Completed)
            .map(|row| row.task_id)
            .collect();
        for row in fresh_rows {
            if row.status == ProgressStatus::Completed {
                completed.insert(row.task_id);
            } else {
                completed.remove(&row.task_id);
            }
        }

        let completed_count = all_tasks.iter().filter(|t| completed.contains(&t.id)).count();
        Ok(current.reconcile(completed_count, all_tasks.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskLevel;

    fn report(passed: usize, total: usize, dry_run: bool) -> VerifyReport {
        let results = (0..total)
            .map(|i| {
                crate::domain::evaluate::evaluate(
                    &Task {
                        id: i as i64,
                        model_id: 1,
                        title: format!("task {i}"),
                        level: TaskLevel::Easy,
                        display_order: i as i64,
                        rules_json: if i < passed {
                            "{}".into()
                        } else {
                            r#"{"min_trades": 1}"#.into()
                        },
                        advanced_json: None,
                    },
                    &[],
                    NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
                )
            })
            .collect();
        VerifyReport {
            user_id: 10,
            model_id: 1,
            results,
            dry_run,
            saved: !dry_run,
            save_error: None,
            enrollment: None,
        }
    }

    #[test]
    fn summary_counts_passes() {
        assert_eq!(report(1, 3, false).summary(), "1 of 3 tasks passed");
    }

    #[test]
    fn summary_flags_dry_run() {
        let s = report(2, 2, true).summary();
        assert!(s.contains("dry run"));
    }

    #[test]
    fn summary_includes_enrollment() {
        let mut r = report(1, 2, false);
        r.enrollment = Some(Enrollment {
            user_id: 10,
            model_id: 1,
            status: crate::domain::progress::EnrollmentStatus::Active,
            progress_pct: 50,
        });
        assert_eq!(
            r.summary(),
            "1 of 2 tasks passed, progress 50% (active)"
        );
    }
}
