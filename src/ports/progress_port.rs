//! Progress and enrollment storage port trait.

use crate::domain::error::CoachError;
use crate::domain::progress::{Enrollment, TaskProgress};

pub trait ProgressPort {
    /// Capability probe. When false the engine degrades to dry-run instead
    /// of failing: results are computed and returned, nothing is written.
    fn is_provisioned(&self) -> bool;

    /// Stored progress rows for one user across a model's tasks.
    fn progress_for(&self, user_id: i64, model_id: i64) -> Result<Vec<TaskProgress>, CoachError>;

    fn get_enrollment(
        &self,
        user_id: i64,
        model_id: i64,
    ) -> Result<Option<Enrollment>, CoachError>;

    /// Page through a model's active/completed enrollments, ordered by
    /// user id. Batch runs chunk through this instead of loading everyone.
    fn active_enrollments(
        &self,
        model_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Enrollment>, CoachError>;

    /// Persist one user's outcome: upsert every progress row and the
    /// reconciled enrollment (when present) as a single atomic unit, so a
    /// partial failure never leaves the two inconsistent.
    ///
    /// Write failures surface as [`CoachError::Persistence`].
    fn save_user_outcome(
        &self,
        rows: &[TaskProgress],
        enrollment: Option<&Enrollment>,
    ) -> Result<(), CoachError>;
}
