//! Backtesting: replay stored races and score the resulting ledger.

pub mod runner;
pub mod scorecard;

pub use runner::{run_backtest, BacktestOutcome};
pub use scorecard::{make_scorecard, price_historical_bets, Scorecard};
