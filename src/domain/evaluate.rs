//! Rule evaluation engine.
//!
//! Evaluates one task's rule set against a user's trade history. Pure and
//! deterministic: the caller supplies the `as_of` date used for time-window
//! math, and nothing here touches storage.
//!
//! # Evaluation order
//!
//! 1. Drop open trades (unless `closed_only` is disabled)
//! 2. Drop trades outside the time window
//! 3. Drop trades failing stop-loss / analysis-link requirements
//! 4. Drop trades failing risk %, position % and reward:risk thresholds
//! 5. Survivors form the matched pool (the task's evidence)
//! 6. Weekly cadence over ISO-week buckets of the matched pool
//! 7. `passed = min_ok && weekly_ok`
//!
//! Thresholds are inclusive with an epsilon tolerance so float boundary
//! values do not flap.

use crate::domain::ruleset::RuleSet;
use crate::domain::task::{Task, TaskLevel};
use crate::domain::trade::Trade;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const EPSILON: f64 = 1e-9;

/// The matched trades backing a pass/fail decision, trimmed for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvidence {
    pub trade_id: i64,
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub exit_date: Option<NaiveDate>,
}

impl From<&Trade> for TradeEvidence {
    fn from(trade: &Trade) -> Self {
        TradeEvidence {
            trade_id: trade.id,
            symbol: trade.symbol.clone(),
            entry_date: trade.entry_date,
            exit_date: trade.exit_date,
        }
    }
}

/// Outcome of the weekly-cadence sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCheck {
    pub configured: bool,
    pub required_weeks: u32,
    pub qualifying_weeks: u32,
    pub ok: bool,
}

impl WeeklyCheck {
    fn not_configured() -> Self {
        WeeklyCheck {
            configured: false,
            required_weeks: 0,
            qualifying_weeks: 0,
            ok: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub task_id: i64,
    pub title: String,
    pub level: TaskLevel,
    pub passed: bool,
    pub evidence: Vec<TradeEvidence>,
    pub matched_count: u32,
    pub required_count: u32,
    pub weekly: WeeklyCheck,
    /// Snapshot of the rule set the decision was made against.
    pub rules: RuleSet,
    /// Set when the rule set could not be decoded; such a result is never
    /// persisted as completed.
    pub diagnostic: Option<String>,
}

impl EvaluationResult {
    /// True when the result may be written to progress storage.
    pub fn persistable(&self) -> bool {
        self.diagnostic.is_none()
    }
}

/// Evaluate one task against a user's trades. Fails closed: an undecodable
/// rule set yields `passed = false` with a diagnostic instead of an error.
pub fn evaluate(task: &Task, trades: &[Trade], as_of: NaiveDate) -> EvaluationResult {
    let rules = match task.rules() {
        Ok(rules) => rules,
        Err(err) => {
            return EvaluationResult {
                task_id: task.id,
                title: task.title.clone(),
                level: task.level,
                passed: false,
                evidence: Vec::new(),
                matched_count: 0,
                required_count: 0,
                weekly: WeeklyCheck::not_configured(),
                rules: RuleSet::default(),
                diagnostic: Some(err.to_string()),
            };
        }
    };

    let pool = matched_pool(&rules, trades, as_of);
    let weekly = weekly_check(&rules, &pool);

    let matched_count = pool.len() as u32;
    let min_ok = rules.min_trades == 0 || matched_count >= rules.min_trades;
    let passed = min_ok && weekly.ok;

    EvaluationResult {
        task_id: task.id,
        title: task.title.clone(),
        level: task.level,
        passed,
        evidence: pool.iter().map(|t| TradeEvidence::from(*t)).collect(),
        matched_count,
        required_count: rules.min_trades,
        weekly,
        rules,
        diagnostic: None,
    }
}

/// Apply the filter chain and return the surviving trades.
fn matched_pool<'a>(rules: &RuleSet, trades: &'a [Trade], as_of: NaiveDate) -> Vec<&'a Trade> {
    let cutoff = if rules.time_window_days > 0 {
        Some(as_of - Duration::days(rules.time_window_days as i64))
    } else {
        None
    };

    trades
        .iter()
        .filter(|t| !rules.closed_only || t.is_closed())
        .filter(|t| cutoff.is_none_or(|cutoff| t.reference_date() >= cutoff))
        .filter(|t| !rules.require_stop_loss || matches!(t.stop_loss, Some(s) if s > 0.0))
        .filter(|t| {
            !rules.require_analysis_link
                || t.analysis_link
                    .as_deref()
                    .is_some_and(|link| !link.trim().is_empty())
        })
        .filter(|t| {
            rules.max_risk_pct.is_none_or(|max| {
                t.risk_pct().is_some_and(|risk| risk <= max + EPSILON)
            })
        })
        .filter(|t| {
            rules.max_position_pct.is_none_or(|max| {
                t.position_percent.is_some_and(|pos| pos <= max + EPSILON)
            })
        })
        .filter(|t| {
            rules.min_risk_reward.is_none_or(|min| {
                t.reward_risk_ratio().is_some_and(|rr| rr + EPSILON >= min)
            })
        })
        .collect()
}

/// Bucket the matched pool by (ISO year, ISO week) of the reference date and
/// inspect up to `weeks` buckets starting from the most recent. The check
/// holds only when every inspected bucket qualifies and there are at least
/// `weeks` buckets to inspect.
fn weekly_check(rules: &RuleSet, pool: &[&Trade]) -> WeeklyCheck {
    if !rules.weekly_configured() {
        return WeeklyCheck::not_configured();
    }

    let mut buckets: BTreeMap<(i32, u32), u32> = BTreeMap::new();
    for trade in pool {
        let week = trade.reference_date().iso_week();
        *buckets.entry((week.year(), week.week())).or_insert(0) += 1;
    }

    let qualifying_weeks = buckets
        .values()
        .rev()
        .take(rules.weeks as usize)
        .filter(|&&count| count >= rules.weekly_min_trades)
        .count() as u32;

    WeeklyCheck {
        configured: true,
        required_weeks: rules.weeks,
        qualifying_weeks,
        ok: qualifying_weeks == rules.weeks,
    }
}
