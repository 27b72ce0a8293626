//! Backtest execution against stored price snapshots.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::{ExecutionService, UnmatchedOrder, VirtualLedger};
use crate::types::{Bet, BetInstruction, PaddockResult, Quote};

/// Read access to recorded quotes, keyed by market.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn market_quotes(&self, market_id: &str) -> PaddockResult<Vec<Quote>>;
}

/// Snapshots held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshots {
    quotes: HashMap<String, Vec<Quote>>,
}

impl InMemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, quote: Quote) {
        self.quotes
            .entry(quote.market_id.clone())
            .or_default()
            .push(quote);
    }

    pub fn from_quotes(quotes: impl IntoIterator<Item = Quote>) -> Self {
        let mut snapshots = Self::new();
        for q in quotes {
            snapshots.insert(q);
        }
        snapshots
    }
}

#[async_trait]
impl SnapshotSource for InMemorySnapshots {
    async fn market_quotes(&self, market_id: &str) -> PaddockResult<Vec<Quote>> {
        Ok(self.quotes.get(market_id).cloned().unwrap_or_default())
    }
}

/// Fills every bet at the snapshot odds.
///
/// Quotes are cached per market for the life of the service with no
/// eviction; the snapshots must not change during a run.
pub struct HistoricalExecutionService<S> {
    source: S,
    cache: HashMap<String, Vec<Quote>>,
    ledger: VirtualLedger,
}

impl<S: SnapshotSource> HistoricalExecutionService<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: HashMap::new(),
            ledger: VirtualLedger::new(),
        }
    }

    pub fn ledger(&self) -> &VirtualLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> VirtualLedger {
        self.ledger
    }

    async fn quotes(&mut self, market_id: &str) -> PaddockResult<Vec<Quote>> {
        if let Some(cached) = self.cache.get(market_id) {
            return Ok(cached.clone());
        }
        let quotes = self.source.market_quotes(market_id).await?;
        debug!(market_id, runners = quotes.len(), "Snapshot loaded");
        self.cache.insert(market_id.to_string(), quotes.clone());
        Ok(quotes)
    }
}

#[async_trait]
impl<S: SnapshotSource> ExecutionService for HistoricalExecutionService<S> {
    fn name(&self) -> &str {
        "historical"
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
