//! Paper trading: real exchange prices, simulated fills.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::pricing::MidPricer;
use super::{ExecutionService, UnmatchedOrder, VirtualLedger};
use crate::platforms::ExchangeGateway;
use crate::types::{Bet, BetInstruction, PaddockResult, Quote};

/// Quotes each market once from the live book and fills bets against that
/// quote, exactly as the historical backend fills against a snapshot.
pub struct PaperExecutionService<G> {
    pricer: MidPricer<G>,
    quotes: HashMap<String, Vec<Quote>>,
    ledger: VirtualLedger,
}

impl<G: ExchangeGateway> PaperExecutionService<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            pricer: MidPricer::new(gateway),
            quotes: HashMap::new(),
            ledger: VirtualLedger::new(),
        }
    }

    pub fn ledger(&self) -> &VirtualLedger {
        &self.ledger
    }

    async fn quotes(&mut self, market_id: &str) -> PaddockResult<Vec<Quote>> {
        if let Some(q) = self.quotes.get(market_id) {
            return Ok(q.clone());
        }
        let priced = self.pricer.price(market_id).await?;
        self.quotes.insert(market_id.to_string(), priced.quotes.clone());
        Ok(priced.quotes)
    }
}

#[async_trait]
impl<G: ExchangeGateway> ExecutionService for PaperExecutionService<G> {
    fn name(&self) -> &str {
        "paper"
    }

    async fn get_market_prices(&mut self, market_id: &str) -> PaddockResult<Vec<Quote>> {
        self.quotes(market_id).await
    }

    async fn place_exchange_bets(
        &mut self,
        market_id: &str,
        bets: &[BetInstruction],
    ) -> PaddockResult<Vec<Bet>> {
        let quotes = self.quotes(market_id).await?;
        self.ledger.fill(market_id, bets, &quotes)
    }

    async fn get_matched_and_unmatched_bets(
        &mut self,
    ) -> PaddockResult<(Vec<Bet>, Vec<UnmatchedOrder>)> {
        Ok((self.ledger.matched().to_vec(), Vec::new()))
    }

    async fn cancel_unmatched(
        &mut self,
        _market_id: &str,
        _runner: Option<&str>,
    ) -> PaddockResult<usize> {
        Ok(0)
    }
}
