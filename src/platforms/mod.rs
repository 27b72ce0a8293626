//! Exchange integrations.
//!
//! Defines the `ExchangeGateway` trait the paper and live execution
//! services talk to, the tagged `GatewayError` every call returns on
//! failure, and the exchange-side data types those calls produce.
//! - Betfair: JSON REST client (`betfair::BetfairClient`)
//! - Odds ladder: tick arithmetic for limit prices (`ladder`)

pub mod betfair;
pub mod ladder;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BetSide, PaddockError, Race};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by the exchange, in place of a payload.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no session: {0}")]
    NoSession(String),

    /// The API answered with an error code.
    #[error("{operation} failed: {code}")]
    Api { operation: String, code: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<GatewayError> for PaddockError {
    fn from(e: GatewayError) -> Self {
        PaddockError::external("exchange", e.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

// ---------------------------------------------------------------------------
// Exchange data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerDefinition {
    pub selection_id: u64,
    /// Name as listed by the exchange, e.g. "3. Sea The Stars".
    pub name: String,
}

/// Static description of a market. Does not change once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDefinition {
    pub market_id: String,
    pub market_name: String,
    pub course: String,
    pub country: String,
    pub scheduled_off: DateTime<Utc>,
    pub runners: Vec<RunnerDefinition>,
}

impl MarketDefinition {
    /// Runner key for a selection id.
    pub fn runner_key(&self, selection_id: u64) -> Option<String> {
        self.runners
            .iter()
            .find(|r| r.selection_id == selection_id)
            .and_then(|r| runner_key(&r.name))
    }

    pub fn selection_id(&self, runner: &str) -> Option<u64> {
        self.runners
            .iter()
            .find(|r| runner_key(&r.name).as_deref() == Some(runner))
            .map(|r| r.selection_id)
    }

    /// An ungraded race for this market, or `None` when a selection is not
    /// a horse (e.g. "Unnamed Favourite").
    pub fn to_race(&self) -> Option<Race> {
        let selection: Option<Vec<String>> =
            self.runners.iter().map(|r| runner_key(&r.name)).collect();
        let selection = selection?;
        Some(Race {
            market_id: self.market_id.clone(),
            scheduled_off: self.scheduled_off,
            country: self.country.clone(),
            course: self.course.clone(),
            event: self.market_name.clone(),
            n_runners: selection.len(),
            selection,
            winners: None,
            ranking: None,
            placeholder: false,
        })
    }
}

/// Normalise an exchange runner name to the key the rating store uses.
///
/// Strips a leading saddle-cloth number ("7. Frankel" → "Frankel").
/// Generic selections such as "Unnamed 2nd Favourite" are rejected.
pub fn runner_key(name: &str) -> Option<String> {
    let trimmed = name.trim();
    let stripped = match trimmed.split_once(". ") {
        Some((num, rest)) if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => trimmed,
    };
    let key = stripped.trim();
    if key.is_empty() || key.to_ascii_lowercase().starts_with("unnamed") {
        return None;
    }
    Some(key.to_string())
}

/// Top of book for one runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerPrices {
    pub selection_id: u64,
    pub best_back: Option<f64>,
    pub best_lay: Option<f64>,
    pub total_matched: f64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub selection_id: u64,
    pub side: BetSide,
    /// Limit price, on the ladder.
    pub price: f64,
    /// Unsigned stake.
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub selection_id: u64,
    pub bet_id: Option<String>,
    pub average_price_matched: Option<f64>,
    pub size_matched: f64,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentOrder {
    pub bet_id: String,
    pub market_id: String,
    pub selection_id: u64,
    pub side: BetSide,
    pub price: f64,
    pub size_matched: f64,
    pub size_remaining: f64,
    pub average_price_matched: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountFunds {
    pub available_to_bet: f64,
    pub exposure: f64,
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Market data and order routing on a betting exchange.
///
/// Session state and the server clock live behind this trait, not in the
/// callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn get_market(&self, market_id: &str) -> GatewayResult<MarketDefinition>;

    async fn get_market_prices(&self, market_id: &str) -> GatewayResult<Vec<RunnerPrices>>;

    async fn place_orders(
        &self,
        market_id: &str,
        orders: Vec<OrderRequest>,
    ) -> GatewayResult<Vec<OrderReport>>;

    /// Orders with unmatched size, optionally for one market.
    async fn list_current_orders(&self, market_id: Option<String>)
        -> GatewayResult<Vec<CurrentOrder>>;

    /// Cancel the given bets; an empty list cancels everything in the market.
    async fn cancel_orders(&self, market_id: &str, bet_ids: Vec<String>) -> GatewayResult<usize>;

    async fn account_funds(&self) -> GatewayResult<AccountFunds>;

    async fn keep_alive(&self) -> GatewayResult<()>;

    /// Exchange clock as of the last response, if any.
    fn server_time(&self) -> Option<DateTime<Utc>>;

    /// Horse-racing WIN markets starting within `hours`.
    async fn future_races(
        &self,
        hours: i64,
        countries: Vec<String>,
    ) -> GatewayResult<Vec<MarketDefinition>>;
}
