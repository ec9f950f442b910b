//! Typed rule sets for task verification.
//!
//! A rule set is stored as a JSON object. The fields the evaluator enforces
//! are typed here; every unrecognized key is preserved in [`RuleSet::extensions`]
//! so forward-compatible rule keys survive a round trip without being
//! silently dropped. Extension keys are recorded for audit, never enforced.

use crate::domain::error::CoachError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Advisory trading mode a task applies to. Not matched against trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    #[default]
    Both,
    Paper,
    Real,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub mode: RuleMode,
    /// Minimum number of matched trades; 0 disables the count check.
    #[serde(default)]
    pub min_trades: u32,
    /// Only consider trades whose reference date falls within the last N
    /// days; 0 means unbounded.
    #[serde(default)]
    pub time_window_days: u32,
    #[serde(default)]
    pub require_stop_loss: bool,
    #[serde(default)]
    pub require_analysis_link: bool,
    #[serde(default)]
    pub max_risk_pct: Option<f64>,
    #[serde(default)]
    pub max_position_pct: Option<f64>,
    #[serde(default)]
    pub min_risk_reward: Option<f64>,
    /// Weekly cadence: at least `weekly_min_trades` per week over `weeks`
    /// consecutive ISO weeks. Both must be positive for the check to apply.
    #[serde(default)]
    pub weekly_min_trades: u32,
    #[serde(default)]
    pub weeks: u32,
    #[serde(default = "default_closed_only")]
    pub closed_only: bool,
    /// Unrecognized keys, kept verbatim. BTreeMap so serialized snapshots
    /// are byte-stable across runs.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

fn default_closed_only() -> bool {
    true
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet {
            mode: RuleMode::Both,
            min_trades: 0,
            time_window_days: 0,
            require_stop_loss: false,
            require_analysis_link: false,
            max_risk_pct: None,
            max_position_pct: None,
            min_risk_reward: None,
            weekly_min_trades: 0,
            weeks: 0,
            closed_only: true,
            extensions: BTreeMap::new(),
        }
    }
}

impl RuleSet {
    /// Whether the weekly cadence check applies.
    pub fn weekly_configured(&self) -> bool {
        self.weekly_min_trades > 0 && self.weeks > 0
    }

    /// Decode a task's effective rule set from its baseline JSON plus an
    /// optional advanced-override JSON object. Any key present in the
    /// override replaces the baseline value of the same name.
    ///
    /// Fails closed: a malformed encoding is a [`CoachError::RuleSetInvalid`],
    /// never a permissive default.
    pub fn decode(
        task_id: i64,
        baseline: &str,
        advanced: Option<&str>,
    ) -> Result<RuleSet, CoachError> {
        let mut map = parse_object(task_id, baseline, "baseline")?;
        if let Some(advanced) = advanced {
            let overrides = parse_object(task_id, advanced, "advanced")?;
            merge_override(&mut map, overrides);
        }
        serde_json::from_value(Value::Object(map)).map_err(|e| CoachError::RuleSetInvalid {
            task_id,
            reason: e.to_string(),
        })
    }
}

fn parse_object(task_id: i64, json: &str, which: &str) -> Result<Map<String, Value>, CoachError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| CoachError::RuleSetInvalid {
            task_id,
            reason: format!("{which}: {e}"),
        })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CoachError::RuleSetInvalid {
            task_id,
            reason: format!("{which}: expected a JSON object, got {other}"),
        }),
    }
}

/// Merge an override map into a baseline map; the override wins on every
/// shared key.
pub fn merge_override(baseline: &mut Map<String, Value>, overrides: Map<String, Value>) {
    for (key, value) in overrides {
        baseline.insert(key, value);
    }
}
