//! Live trading: real prices and real orders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::*;
use tracing::{info, warn};

use super::pricing::{MidPricer, PricedMarket};
use super::{ExecutionService, UnmatchedOrder, VirtualLedger};
use crate::platforms::ladder::{ladder, Rounding};
use crate::platforms::{ExchangeGateway, OrderRequest};
use crate::types::{Bet, BetInstruction, BetSide, PaddockError, PaddockResult, Quote};

/// Widest back/lay gap, in ladder ticks, still traded into.
pub const DEFAULT_MAX_SPREAD_TICKS: i64 = 10;

/// Routes orders to the exchange as limit orders at the best opposing
/// price, rounded onto the ladder.
///
/// Only the matched part of an order enters the ledger, at the exchange's
/// average matched price. Whatever did not match stays on the exchange and
/// shows up in `get_matched_and_unmatched_bets`.
pub struct LiveExecutionService<G> {
    pricer: MidPricer<G>,
    /// Latest book per market, refreshed on every price request.
    books: HashMap<String, PricedMarket>,
    ledger: VirtualLedger,
    max_spread_ticks: i64,
}

impl<G: ExchangeGateway> LiveExecutionService<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            pricer: MidPricer::new(gateway),
            books: HashMap::new(),
            ledger: VirtualLedger::new(),
            max_spread_ticks: DEFAULT_MAX_SPREAD_TICKS,
        }
    }

    /// Refuse to trade runners whose book is wider than `ticks`.
    pub fn with_max_spread_ticks(mut self, ticks: i64) -> Self {
        self.max_spread_ticks = ticks;
        self
    }

    pub fn ledger(&self) -> &VirtualLedger {
        &self.ledger
    }

    async fn book(&mut self, market_id: &str) -> PaddockResult<PricedMarket> {
        if let Some(b) = self.books.get(market_id) {
            return Ok(b.clone());
        }
        let priced = self.pricer.price(market_id).await?;
        self.books.insert(market_id.to_string(), priced.clone());
        Ok(priced)
    }

    fn order_for(
        &self,
        market: &PricedMarket,
        instruction: &BetInstruction,
    ) -> PaddockResult<OrderRequest> {
        let market_id = &market.definition.market_id;
        let missing = || {
            PaddockError::Data(format!(
                "market {market_id}: runner {} is not in the book",
                instruction.runner
            ))
        };
        let selection_id = market
            .definition
            .selection_id(&instruction.runner)
            .ok_or_else(missing)?;
        let prices = market.runner_prices(&instruction.runner).ok_or_else(missing)?;
        let mid = market
            .quotes
            .iter()
            .find(|q| q.runner == instruction.runner)
            .map(|q| q.odds)
            .ok_or_else(missing)?;

        let ladder = ladder();
        let back = prices.best_back.and_then(Decimal::from_f64);
        let lay = prices.best_lay.and_then(Decimal::from_f64);
        if let (Some(b), Some(l)) = (back, lay) {
            let spread = ladder.tick_spread(b, l);
            if spread > self.max_spread_ticks {
                return Err(PaddockError::Data(format!(
                    "market {market_id}: {} is {spread} ticks wide (limit {})",
                    instruction.runner, self.max_spread_ticks
                )));
            }
        }

        // An empty side is priced one tick off the other side.
        let side = instruction.side();
        let price = match (side, back, lay) {
            (BetSide::Back, Some(b), _) => ladder.round(b, Rounding::Down).to_f64(),
            (BetSide::Back, None, Some(l)) => ladder.shift(l, -1).to_f64(),
            (BetSide::Lay, _, Some(l)) => ladder.round(l, Rounding::Up).to_f64(),
            (BetSide::Lay, Some(b), None) => ladder.shift(b, 1).to_f64(),
            (BetSide::Back, None, None) => ladder.round_f64(mid, Rounding::Down),
            (BetSide::Lay, None, None) => ladder.round_f64(mid, Rounding::Up),
        }
        .ok_or_else(|| {
            PaddockError::NumericalDegeneracy(format!(
                "market {market_id}: cannot place {} at price {mid}",
                instruction.runner
            ))
        })?;
        Ok(OrderRequest {
            selection_id,
            side,
            price,
            size: instruction.stake.abs(),
        })
    }
}

#[async_trait]
impl<G: ExchangeGateway> ExecutionService for LiveExecutionService<G> {
    fn name(&self) -> &str {
        "live"
    }

    async fn get_market_prices(&mut self, market_id: &str) -> PaddockResult<Vec<Quote>> {
        let priced = self.pricer.price(market_id).await?;
        let quotes = priced.quotes.clone();
        self.books.insert(market_id.to_string(), priced);
        Ok(quotes)
    }

    async fn place_exchange_bets(
        &mut self,
        market_id: &str,
        bets: &[BetInstruction],
    ) -> PaddockResult<Vec<Bet>> {
        let market = self.book(market_id).await?;
        let orders = bets
            .iter()
            .map(|b| self.order_for(&market, b))
            .collect::<PaddockResult<Vec<_>>>()?;

        let reports = self
            .pricer
            .gateway()
            .place_orders(market_id, orders)
            .await?;

        let mut matched = Vec::new();
        for (instruction, report) in bets.iter().zip(&reports) {
            if let Some(code) = &report.error_code {
                warn!(
                    market_id,
                    runner = %instruction.runner,
                    code = %code,
                    "Order rejected by exchange"
                );
                continue;
            }
            let Some(odds) = report.average_price_matched.filter(|_| report.size_matched > 0.0)
            else {
                info!(
                    market_id,
                    runner = %instruction.runner,
                    "Order resting unmatched"
                );
                continue;
            };
            let bet = Bet {
                bet_id: report
                    .bet_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                market_id: market_id.to_string(),
                runner: instruction.runner.clone(),
                stake: report.size_matched.copysign(instruction.stake),
                odds,
                volume: market
                    .runner_prices(&instruction.runner)
                    .map_or(0.0, |p| p.total_matched),
                model_probability: instruction.model_probability,
                implied_probability: instruction.implied_probability,
                selection_won: None,
                pnl: None,
            };
            info!(
                bet_id = %bet.bet_id,
                market_id,
                side = %bet.side(),
                runner = %bet.runner,
                stake = format!("£{:.2}", bet.stake.abs()),
                odds = format!("{:.2}", bet.odds),
                "Exchange bet matched"
            );
            self.ledger.record(bet.clone());
            matched.push(bet);
        }
        Ok(matched)
    }

    async fn get_matched_and_unmatched_bets(
        &mut self,
    ) -> PaddockResult<(Vec<Bet>, Vec<UnmatchedOrder>)> {
        let orders = self.pricer.gateway().list_current_orders(None).await?;
        let unmatched = orders
            .into_iter()
            .filter(|o| o.size_remaining > 0.0)
            .map(|o| {
                let runner = self
                    .pricer
                    .definition(&o.market_id)
                    .and_then(|d| d.runner_key(o.selection_id))
                    .unwrap_or_else(|| o.selection_id.to_string());
                UnmatchedOrder {
                    bet_id: o.bet_id,
                    market_id: o.market_id,
                    runner,
                    side: o.side,
                    price: o.price,
                    size_remaining: o.size_remaining,
                }
            })
            .collect();
        Ok((self.ledger.matched().to_vec(), unmatched))
    }

    async fn cancel_unmatched(
        &mut self,
        market_id: &str,
        runner: Option<&str>,
    ) -> PaddockResult<usize> {
        let gateway = self.pricer.gateway().clone();
        let bet_ids = match runner {
            None => Vec::new(),
            Some(runner) => {
                let selection_id = self
                    .pricer
                    .definition(market_id)
                    .and_then(|d| d.selection_id(runner))
                    .ok_or_else(|| {
                        PaddockError::Data(format!("market {market_id}: unknown runner {runner}"))
                    })?;
                let ids: Vec<String> = gateway
                    .list_current_orders(Some(market_id.to_string()))
                    .await?
                    .into_iter()
                    .filter(|o| o.selection_id == selection_id && o.size_remaining > 0.0)
                    .map(|o| o.bet_id)
                    .collect();
                if ids.is_empty() {
                    return Ok(0);
                }
                ids
            }
        };
        let cancelled = gateway.cancel_orders(market_id, bet_ids).await?;
        info!(market_id, runner = ?runner, cancelled, "Unmatched orders cancelled");
        Ok(cancelled)
    }
}
