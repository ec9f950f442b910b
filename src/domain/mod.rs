//! Core domain types and verification logic.

pub mod task;
pub mod trade;
pub mod ruleset;
pub mod evaluate;
pub mod progress;
pub mod orchestrator;
pub mod error;
