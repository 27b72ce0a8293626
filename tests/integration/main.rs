//! End-to-end tests: stored races through the strategy, the historical
//! executor and the scorecard.

mod backtest;
mod exposure;
mod fixtures;
