//! Execution services.
//!
//! The orchestrator prices and bets through the `ExecutionService` trait.
//! Three backends implement it:
//! - `HistoricalExecutionService`: stored price snapshots, simulated fills
//! - `PaperExecutionService`: live exchange prices, simulated fills
//! - `LiveExecutionService`: live prices and real orders
//!
//! Every bet a backend returns from `place_exchange_bets` is matched at a
//! concrete price; partially matched or pending state never reaches the
//! caller's ledger.

pub mod historical;
pub mod ledger;
pub mod live;
pub mod paper;
pub mod pricing;
pub mod throttle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Bet, BetInstruction, BetSide, PaddockResult, Quote};

pub use historical::{HistoricalExecutionService, InMemorySnapshots, SnapshotSource};
pub use ledger::VirtualLedger;
pub use live::LiveExecutionService;
pub use paper::PaperExecutionService;
pub use throttle::Throttle;

/// Order resting on the exchange with unmatched size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedOrder {
    pub bet_id: String,
    pub market_id: String,
    pub runner: String,
    pub side: BetSide,
    pub price: f64,
    pub size_remaining: f64,
}

#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Current quotes for every runner in the market.
    async fn get_market_prices(&mut self, market_id: &str) -> PaddockResult<Vec<Quote>>;

    /// Place the instructions; returns the bets that were matched.
    async fn place_exchange_bets(
        &mut self,
        market_id: &str,
        bets: &[BetInstruction],
    ) -> PaddockResult<Vec<Bet>>;

    /// The matched ledger so far, plus anything still resting.
    async fn get_matched_and_unmatched_bets(
        &mut self,
    ) -> PaddockResult<(Vec<Bet>, Vec<UnmatchedOrder>)>;

    /// Cancel resting orders in a market, optionally for one runner only.
    /// Returns how many were cancelled.
    async fn cancel_unmatched(&mut self, market_id: &str, runner: Option<&str>)
        -> PaddockResult<usize>;
}
