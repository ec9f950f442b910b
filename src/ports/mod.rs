//! Port traits decoupling the engine from its collaborators.

pub mod config_port;
pub mod catalog_port;
pub mod ledger_port;
pub mod progress_port;
