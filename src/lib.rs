//! PADDOCK: skill-rated pricing and risk-adjusted staking for
//! horse-racing win markets.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod backtest;
pub mod config;
pub mod execution;
pub mod platforms;
pub mod rating;
pub mod storage;
pub mod strategy;
pub mod types;
