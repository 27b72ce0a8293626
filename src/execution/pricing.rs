//! Quotes from the live exchange book.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::platforms::{ExchangeGateway, MarketDefinition, RunnerPrices};
use crate::types::{PaddockResult, Quote};

/// Price used when nobody is offering to back.
pub const EMPTY_BACK_PRICE: f64 = 1.01;
/// Price used when nobody is offering to lay.
pub const EMPTY_LAY_PRICE: f64 = 1000.0;

/// A priced market: quotes plus the raw book they came from.
#[derive(Debug, Clone)]
pub struct PricedMarket {
    pub definition: MarketDefinition,
    pub book: Vec<RunnerPrices>,
    pub quotes: Vec<Quote>,
}

impl PricedMarket {
    pub fn runner_prices(&self, runner: &str) -> Option<&RunnerPrices> {
        let id = self.definition.selection_id(runner)?;
        self.book.iter().find(|p| p.selection_id == id)
    }
}

/// Mid-price quoting with memoised market definitions.
pub struct MidPricer<G> {
    gateway: Arc<G>,
    definitions: HashMap<String, MarketDefinition>,
}

impl<G: ExchangeGateway> MidPricer<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            definitions: HashMap::new(),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn definition(&self, market_id: &str) -> Option<&MarketDefinition> {
        self.definitions.get(market_id)
    }

    async fn load_definition(&mut self, market_id: &str) -> PaddockResult<MarketDefinition> {
        if let Some(def) = self.definitions.get(market_id) {
            return Ok(def.clone());
        }
        let def = self.gateway.get_market(market_id).await?;
        self.definitions.insert(market_id.to_string(), def.clone());
        Ok(def)
    }

    /// Fetch the book and quote every active, named runner at mid price.
    pub async fn price(&mut self, market_id: &str) -> PaddockResult<PricedMarket> {
        let definition = self.load_definition(market_id).await?;
        let book = self.gateway.get_market_prices(market_id).await?;

        let mut quotes = Vec::with_capacity(book.len());
        for prices in book.iter().filter(|p| p.active) {
            let Some(runner) = definition.runner_key(prices.selection_id) else {
                warn!(
                    market_id,
                    selection_id = prices.selection_id,
                    "Book runner missing from market definition"
                );
                continue;
            };
            quotes.push(Quote {
                market_id: market_id.to_string(),
                runner,
                odds: mid_price(prices),
                volume: prices.total_matched,
            });
        }
        debug!(market_id, runners = quotes.len(), "Market priced");

        Ok(PricedMarket {
            definition,
            book,
            quotes,
        })
    }
}

/// Midpoint of best back and best lay.
pub fn mid_price(prices: &RunnerPrices) -> f64 {
    let back = prices.best_back.unwrap_or(EMPTY_BACK_PRICE);
    let lay = prices.best_lay.unwrap_or(EMPTY_LAY_PRICE);
    (back + lay) / 2.0
}
