//! mtmcoach — task verification and progress reconciliation engine for
//! Mental Trading Model (MTM) coaching programs.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
