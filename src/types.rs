//! Shared types for PADDOCK.
//!
//! These types form the data model used across all modules: race records
//! and price quotes coming in from the collaborator store, bet instructions
//! and matched bets going out to the execution layer, and the error
//! taxonomy every component reports through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Event name used by the exchange for place (rather than win) markets.
pub const PLACEHOLDER_EVENT_NAME: &str = "to be placed";

// ---------------------------------------------------------------------------
// Race
// ---------------------------------------------------------------------------

/// A single-winner race (one exchange WIN market).
///
/// Immutable once read from the store; consumed once per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Race {
    pub market_id: String,
    pub scheduled_off: DateTime<Utc>,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub course: String,
    /// Exchange event / market name, e.g. "2m4f Hcap" or "To Be Placed".
    #[serde(default)]
    pub event: String,
    /// Runner keys, in card order.
    pub selection: Vec<String>,
    /// Winners, when the result is known.
    #[serde(default)]
    pub winners: Option<Vec<String>>,
    /// Finish ranking parallel to `selection` (0 = winner, ties share a rank).
    #[serde(default)]
    pub ranking: Option<Vec<u32>>,
    pub n_runners: usize,
    /// Aggregate / placeholder market that must never be priced or fit.
    #[serde(default)]
    pub placeholder: bool,
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} ({} runners)",
            self.market_id,
            self.scheduled_off.format("%Y-%m-%d %H:%M"),
            self.course,
            self.event,
            self.n_runners,
        )
    }
}

impl Race {
    /// Whether this is a placeholder / aggregate market.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder || self.event.trim().eq_ignore_ascii_case(PLACEHOLDER_EVENT_NAME)
    }

    /// Required-field and consistency checks.
    pub fn validate(&self) -> Result<(), PaddockError> {
        if self.market_id.trim().is_empty() {
            return Err(PaddockError::Data("race has an empty market id".into()));
        }
        if self.n_runners != self.selection.len() {
            return Err(PaddockError::Data(format!(
                "market {}: n_runners={} but selection has {} entries",
                self.market_id,
                self.n_runners,
                self.selection.len()
            )));
        }
        let mut seen = HashSet::with_capacity(self.selection.len());
        for runner in &self.selection {
            if !seen.insert(runner.as_str()) {
                return Err(PaddockError::Data(format!(
                    "market {}: runner {runner} appears twice",
                    self.market_id
                )));
            }
        }
        if let Some(ranking) = &self.ranking {
            if ranking.len() != self.selection.len() {
                return Err(PaddockError::Data(format!(
                    "market {}: ranking has {} entries for {} runners",
                    self.market_id,
                    ranking.len(),
                    self.selection.len()
                )));
            }
        }
        if let Some(winners) = &self.winners {
            if let Some(unknown) = winners.iter().find(|w| !seen.contains(w.as_str())) {
                return Err(PaddockError::Data(format!(
                    "market {}: winner {unknown} is not in the selection",
                    self.market_id
                )));
            }
        }
        Ok(())
    }

    /// The ranking to fit ratings against.
    ///
    /// Explicit ranking wins; otherwise winners get rank 0 and everyone else
    /// rank 1. `None` means the race is ungraded.
    pub fn effective_ranking(&self) -> Option<Vec<u32>> {
        if let Some(ranking) = &self.ranking {
            return Some(ranking.clone());
        }
        self.winners.as_ref().map(|winners| {
            self.selection
                .iter()
                .map(|r| if winners.contains(r) { 0 } else { 1 })
                .collect()
        })
    }

    /// Whether `runner` won, judged by the winner set or a rank of 0.
    pub fn is_winner(&self, runner: &str) -> bool {
        if let Some(winners) = &self.winners {
            return winners.iter().any(|w| w == runner);
        }
        match (&self.ranking, self.selection.iter().position(|r| r == runner)) {
            (Some(ranking), Some(i)) => ranking.get(i) == Some(&0),
            _ => false,
        }
    }

    /// Whether the outcome of this race is known.
    pub fn is_graded(&self) -> bool {
        self.ranking.is_some() || self.winners.is_some()
    }
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// Odds and traded volume for one runner at decision time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub market_id: String,
    pub runner: String,
    /// Decimal odds (> 1.0).
    pub odds: f64,
    /// Volume traded on this runner so far.
    pub volume: f64,
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {:.2} (vol: {:.0})",
            self.market_id, self.runner, self.odds, self.volume
        )
    }
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Bet direction, derived from the sign of a stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetSide {
    Back,
    Lay,
}

impl BetSide {
    /// Back for positive stakes, lay for negative ones.
    pub fn from_stake(stake: f64) -> Self {
        if stake >= 0.0 {
            BetSide::Back
        } else {
            BetSide::Lay
        }
    }

    /// Wire name used by the exchange.
    pub fn as_exchange_str(&self) -> &'static str {
        match self {
            BetSide::Back => "BACK",
            BetSide::Lay => "LAY",
        }
    }
}

impl fmt::Display for BetSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_exchange_str())
    }
}

/// A stake the orchestrator wants placed, before it is matched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BetInstruction {
    pub runner: String,
    /// Signed stake: positive = back, negative = lay.
    pub stake: f64,
    /// Model win probability the stake was sized against.
    pub model_probability: f64,
    /// Market-implied win probability at decision time.
    pub implied_probability: f64,
}

impl BetInstruction {
    pub fn side(&self) -> BetSide {
        BetSide::from_stake(self.stake)
    }
}

/// A matched bet in the append-only ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub bet_id: String,
    pub market_id: String,
    pub runner: String,
    /// Signed stake: positive = back, negative = lay.
    pub stake: f64,
    /// Odds the bet was matched at.
    pub odds: f64,
    /// Volume traded on the runner when the bet was matched.
    pub volume: f64,
    pub model_probability: f64,
    pub implied_probability: f64,
    /// Filled in once the race outcome is known.
    #[serde(default)]
    pub selection_won: Option<bool>,
    #[serde(default)]
    pub pnl: Option<f64>,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} £{:.2} @ {:.2} (p={:.3}, implied={:.3})",
            self.market_id,
            self.side(),
            self.runner,
            self.stake.abs(),
            self.odds,
            self.model_probability,
            self.implied_probability,
        )
    }
}

impl Bet {
    pub fn side(&self) -> BetSide {
        BetSide::from_stake(self.stake)
    }

    /// Attach outcome-derived fields. The only mutation a ledger entry ever sees.
    pub fn settle(&mut self, won: bool) {
        self.selection_won = Some(won);
        self.pnl = Some(bet_pnl(self.stake, self.odds, won));
    }
}

/// Profit and loss of a signed stake on a single-winner market.
pub fn bet_pnl(stake: f64, odds: f64, won: bool) -> f64 {
    if won {
        stake * (odds - 1.0)
    } else {
        -stake
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain error taxonomy for PADDOCK.
#[derive(Debug, thiserror::Error)]
pub enum PaddockError {
    /// Invalid constructor parameters. Raised at construction, never mid-run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed or inconsistent race record. The race is skipped.
    #[error("Data error: {0}")]
    Data(String),

    /// The gateway or collaborator returned a failure instead of data.
    #[error("External service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    /// Probabilities or stakes failed their sanity checks.
    #[error("Numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaddockError {
    pub fn external(service: &str, message: impl Into<String>) -> Self {
        PaddockError::ExternalService {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

pub type PaddockResult<T> = std::result::Result<T, PaddockError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
