//! Per-task progress rows and per-model enrollment state.
//!
//! Both record kinds are owned exclusively by the verification engine;
//! nothing else writes them. A `TaskProgress` row always mirrors the most
//! recent evaluation, never an accumulation of history.

use crate::domain::error::CoachError;
use crate::domain::evaluate::EvaluationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Pending,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> ProgressStatus {
        match s {
            "completed" => ProgressStatus::Completed,
            _ => ProgressStatus::Pending,
        }
    }
}

/// Unique per (user_id, task_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub user_id: i64,
    pub task_id: i64,
    pub status: ProgressStatus,
    pub evidence_count: u32,
    pub last_checked_at: DateTime<Utc>,
    /// Serialized [`EvaluationResult`] for audit.
    pub details: String,
}

impl TaskProgress {
    /// Build the row for an evaluation. Status is completed iff the result
    /// passed; re-running on unchanged trades yields identical fields apart
    /// from `last_checked_at`.
    pub fn from_result(
        user_id: i64,
        result: &EvaluationResult,
        checked_at: DateTime<Utc>,
    ) -> Result<TaskProgress, CoachError> {
        let details = serde_json::to_string(result).map_err(|e| CoachError::Persistence {
            reason: format!("serializing evaluation details: {e}"),
        })?;
        Ok(TaskProgress {
            user_id,
            task_id: result.task_id,
            status: if result.passed {
                ProgressStatus::Completed
            } else {
                ProgressStatus::Pending
            },
            evidence_count: result.matched_count,
            last_checked_at: checked_at,
            details,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Active,
    Completed,
    Rejected,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Rejected => "rejected",
            EnrollmentStatus::Dropped => "dropped",
        }
    }

    pub fn parse(s: &str) -> Option<EnrollmentStatus> {
        match s {
            "pending" => Some(EnrollmentStatus::Pending),
            "active" => Some(EnrollmentStatus::Active),
            "completed" => Some(EnrollmentStatus::Completed),
            "rejected" => Some(EnrollmentStatus::Rejected),
            "dropped" => Some(EnrollmentStatus::Dropped),
            _ => None,
        }
    }

    /// Only active and completed enrollments are subject to reconciliation.
    pub fn reconcilable(&self) -> bool {
        matches!(self, EnrollmentStatus::Active | EnrollmentStatus::Completed)
    }
}

/// Unique per (user_id, model_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub user_id: i64,
    pub model_id: i64,
    pub status: EnrollmentStatus,
    pub progress_pct: u8,
}

impl Enrollment {
    /// Recompute completion percentage and status from task counts.
    ///
    /// Returns `None` for pending/rejected/dropped enrollments, which
    /// evaluation never touches. For active/completed ones the recomputation
    /// is unconditional: a completed enrollment whose trade data no longer
    /// supports all tasks regresses to active. That regression is policy,
    /// not an accident.
    pub fn reconcile(&self, completed_tasks: usize, total_tasks: usize) -> Option<Enrollment> {
        if !self.status.reconcilable() {
            return None;
        }
        let pct = progress_pct(completed_tasks, total_tasks);
        Some(Enrollment {
            user_id: self.user_id,
            model_id: self.model_id,
            status: if pct >= 100 {
                EnrollmentStatus::Completed
            } else {
                EnrollmentStatus::Active
            },
            progress_pct: pct,
        })
    }
}

/// round(100 × completed / total), clamped to [0, 100]. A model with no
/// tasks reports 0.
pub fn progress_pct(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (100.0 * completed as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluate::WeeklyCheck;
    use crate::domain::ruleset::RuleSet;
    use crate::domain::task::TaskLevel;
    use proptest::prelude::*;

    fn sample_result(passed: bool) -> EvaluationResult {
        EvaluationResult {
            task_id: 4,
            title: "Journal every trade".into(),
            level: TaskLevel::Easy,
            passed,
            evidence: Vec::new(),
            matched_count: 3,
            required_count: 3,
            weekly: WeeklyCheck {
                configured: false,
                required_weeks: 0,
                qualifying_weeks: 0,
                ok: true,
            },
            rules: RuleSet::default(),
            diagnostic: None,
        }
    }

    fn enrollment(status: EnrollmentStatus, pct: u8) -> Enrollment {
        Enrollment {
            user_id: 10,
            model_id: 2,
            status,
            progress_pct: pct,
        }
    }

    #[test]
    fn progress_row_from_passed_result() {
        let now = Utc::now();
        let row = TaskProgress::from_result(10, &sample_result(true), now).unwrap();
        assert_eq!(row.user_id, 10);
        assert_eq!(row.task_id, 4);
        assert_eq!(row.status, ProgressStatus::Completed);
        assert_eq!(row.evidence_count, 3);
        assert_eq!(row.last_checked_at, now);
        assert!(row.details.contains("\"passed\":true"));
    }

    #[test]
    fn progress_row_from_failed_result() {
        let row = TaskProgress::from_result(10, &sample_result(false), Utc::now()).unwrap();
        assert_eq!(row.status, ProgressStatus::Pending);
    }

    #[test]
    fn progress_row_details_are_stable() {
        let now = Utc::now();
        let a = TaskProgress::from_result(10, &sample_result(true), now).unwrap();
        let b = TaskProgress::from_result(10, &sample_result(true), now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn pct_rounds() {
        assert_eq!(progress_pct(0, 2), 0);
        assert_eq!(progress_pct(1, 2), 50);
        assert_eq!(progress_pct(2, 2), 100);
        assert_eq!(progress_pct(1, 3), 33);
        assert_eq!(progress_pct(2, 3), 67);
        assert_eq!(progress_pct(0, 0), 0);
    }

    #[test]
    fn reconcile_promotes_to_completed() {
        let e = enrollment(EnrollmentStatus::Active, 50).reconcile(2, 2).unwrap();
        assert_eq!(e.status, EnrollmentStatus::Completed);
        assert_eq!(e.progress_pct, 100);
    }

    #[test]
    fn reconcile_regresses_completed_to_active() {
        // completed at 100%, a re-run finds 1 of 2 tasks passing
        let e = enrollment(EnrollmentStatus::Completed, 100)
            .reconcile(1, 2)
            .unwrap();
        assert_eq!(e.status, EnrollmentStatus::Active);
        assert_eq!(e.progress_pct, 50);
    }

    #[test]
    fn reconcile_skips_untouchable_statuses() {
        for status in [
            EnrollmentStatus::Pending,
            EnrollmentStatus::Rejected,
            EnrollmentStatus::Dropped,
        ] {
            assert!(enrollment(status, 0).reconcile(2, 2).is_none());
        }
    }

    proptest! {
        #[test]
        fn pct_always_in_range(completed in 0usize..500, total in 0usize..500) {
            let pct = progress_pct(completed, total);
            prop_assert!(pct <= 100);
        }

        #[test]
        fn reconciled_status_matches_pct(completed in 0usize..20, total in 1usize..20) {
            let completed = completed.min(total);
            let e = enrollment(EnrollmentStatus::Active, 0)
                .reconcile(completed, total)
                .unwrap();
            prop_assert_eq!(
                e.status == EnrollmentStatus::Completed,
                e.progress_pct >= 100
            );
        }
    }
}
