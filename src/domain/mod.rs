//! Core domain types and logic.

pub mod ohlcv;
pub mod signal;
pub mod aggregate;
pub mod position;
pub mod ledger;
pub mod simulator;
pub mod metrics;
pub mod search;
pub mod config_validation;
pub mod error;
