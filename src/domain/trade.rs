//! Trade records and per-trade numeric facts.
//!
//! Trades are read-only input from the ledger. The helpers here compute the
//! facts the rule evaluator filters on: closed-ness, risk %, reward:risk.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outcome label marking a trade that is still running.
pub const OPEN_OUTCOME: &str = "OPEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub target_price: Option<f64>,
    pub exit_price: Option<f64>,
    /// Free-text outcome label; [`OPEN_OUTCOME`] is the "not closed" sentinel.
    pub outcome: String,
    pub entry_date: NaiveDate,
    pub exit_date: Option<NaiveDate>,
    pub position_percent: Option<f64>,
    pub analysis_link: Option<String>,
}

impl Trade {
    /// A trade counts as closed when ANY of three signals says so: a
    /// non-"OPEN" outcome label, a positive exit price, or an exit date.
    ///
    /// The OR is deliberate, and it means a row with `exit_price > 0` but
    /// `outcome == "OPEN"` is treated as closed. Ambiguous rows like that
    /// are a data-quality risk in the ledger, not something this predicate
    /// resolves.
    pub fn is_closed(&self) -> bool {
        let outcome = self.outcome.trim();
        if !outcome.is_empty() && outcome != OPEN_OUTCOME {
            return true;
        }
        if matches!(self.exit_price, Some(p) if p > 0.0) {
            return true;
        }
        self.exit_date.is_some()
    }

    /// Date used for time-window and weekly-cadence checks: exit date when
    /// the trade has one, entry date otherwise.
    pub fn reference_date(&self) -> NaiveDate {
        self.exit_date.unwrap_or(self.entry_date)
    }

    /// (entry − stop) / entry × 100. Undefined when the entry price is not
    /// positive or no stop loss is set.
    pub fn risk_pct(&self) -> Option<f64> {
        if self.entry_price <= 0.0 {
            return None;
        }
        let stop = self.stop_loss?;
        Some((self.entry_price - stop) / self.entry_price * 100.0)
    }

    /// Reward % divided by risk %. Undefined when the target is missing or
    /// the risk is undefined or zero.
    pub fn reward_risk_ratio(&self) -> Option<f64> {
        let target = self.target_price?;
        let risk = self.risk_pct()?;
        if risk.abs() < f64::EPSILON {
            return None;
        }
        let reward = (target - self.entry_price) / self.entry_price * 100.0;
        Some(reward / risk)
    }
}
