//! Task catalog port trait.
//!
//! Models and tasks are authored through an external configuration surface;
//! the engine only reads them.

use crate::domain::error::CoachError;
use crate::domain::task::Task;

pub trait CatalogPort {
    fn model_exists(&self, model_id: i64) -> Result<bool, CoachError>;

    fn get_task(&self, task_id: i64) -> Result<Option<Task>, CoachError>;

    /// All tasks of a model, ordered by display order.
    fn list_tasks(&self, model_id: i64) -> Result<Vec<Task>, CoachError>;
}
