//! Task records within an MTM model.

use crate::domain::error::CoachError;
use crate::domain::ruleset::RuleSet;
use serde::{Deserialize, Serialize};

/// Difficulty grade assigned by the coach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLevel {
    Easy,
    Moderate,
    Hard,
}

impl TaskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskLevel::Easy => "easy",
            TaskLevel::Moderate => "moderate",
            TaskLevel::Hard => "hard",
        }
    }

    /// Parse the storage representation; unknown labels default to Moderate.
    pub fn parse(s: &str) -> TaskLevel {
        match s {
            "easy" => TaskLevel::Easy,
            "hard" => TaskLevel::Hard,
            _ => TaskLevel::Moderate,
        }
    }
}

/// One gradeable unit within a model. Rule sets are stored as JSON and
/// decoded lazily so a malformed encoding fails one task, not the whole run.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub model_id: i64,
    pub title: String,
    pub level: TaskLevel,
    pub display_order: i64,
    pub rules_json: String,
    /// Optional "advanced override" map; its keys replace baseline keys.
    pub advanced_json: Option<String>,
}

impl Task {
    /// Decode the effective rule set (baseline merged with the advanced
    /// override, override wins).
    pub fn rules(&self) -> Result<RuleSet, CoachError> {
        RuleSet::decode(self.id, &self.rules_json, self.advanced_json.as_deref())
    }
}
