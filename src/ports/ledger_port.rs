//! Trade ledger port trait.
//!
//! Read-only. Implementations must already exclude soft-deleted rows.

use crate::domain::error::CoachError;
use crate::domain::trade::Trade;

pub trait LedgerPort {
    fn trades_for_user(&self, user_id: i64) -> Result<Vec<Trade>, CoachError>;
}
