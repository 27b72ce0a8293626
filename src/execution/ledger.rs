//! Append-only ledger of simulated fills.

use std::collections::HashMap;

use tracing::info;

use crate::types::{Bet, BetInstruction, PaddockError, PaddockResult, Quote};

/// Fills instructions at the quoted odds and keeps the matched bets.
///
/// Bet ids are sequential so two replays over the same data produce the
/// same ledger.
#[derive(Debug, Clone, Default)]
pub struct VirtualLedger {
    matched: Vec<Bet>,
}

impl VirtualLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match every instruction at its runner's quote.
    ///
    /// Fails without recording anything if a runner has no quote.
    pub fn fill(
        &mut self,
        market_id: &str,
        instructions: &[BetInstruction],
        quotes: &[Quote],
    ) -> PaddockResult<Vec<Bet>> {
        let by_runner: HashMap<&str, &Quote> =
            quotes.iter().map(|q| (q.runner.as_str(), q)).collect();

        let mut filled = Vec::with_capacity(instructions.len());
        for instruction in instructions {
            let quote = by_runner.get(instruction.runner.as_str()).ok_or_else(|| {
                PaddockError::Data(format!(
                    "market {market_id}: no quote for runner {}",
                    instruction.runner
                ))
            })?;
            filled.push(Bet {
                bet_id: format!("{market_id}/{:06}", self.matched.len() + filled.len() + 1),
                market_id: market_id.to_string(),
                runner: instruction.runner.clone(),
                stake: instruction.stake,
                odds: quote.odds,
                volume: quote.volume,
                model_probability: instruction.model_probability,
                implied_probability: instruction.implied_probability,
                selection_won: None,
                pnl: None,
            });
        }

        for bet in &filled {
            info!(
                bet_id = %bet.bet_id,
                market_id = %bet.market_id,
                side = %bet.side(),
                runner = %bet.runner,
                stake = format!("£{:.2}", bet.stake.abs()),
                odds = format!("{:.2}", bet.odds),
                "Bet matched"
            );
        }
        self.matched.extend(filled.iter().cloned());
        Ok(filled)
    }

    /// Append a bet matched elsewhere (e.g. on the real exchange).
    pub fn record(&mut self, bet: Bet) {
        self.matched.push(bet);
    }

    pub fn matched(&self) -> &[Bet] {
        &self.matched
    }

    pub fn len(&self) -> usize {
        self.matched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn into_bets(self) -> Vec<Bet> {
        self.matched
    }
}
