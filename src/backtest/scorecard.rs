//! Backtest scorecard.
//!
//! Settles ledger bets against race results and summarises them: totals
//! for backs and lays, a per-market breakdown with commission and
//! collateral, daily P&L, and how well the model explained the winners
//! compared with the market and a uniform guess.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::strategy::sizing::bet_returns;
use crate::strategy::DecisionRecord;
use crate::types::{Bet, PaddockError, PaddockResult, Race};

/// Exchange commission on net market winnings.
pub const DEFAULT_COMMISSION: f64 = 0.05;

/// Floor applied to probabilities before taking logs.
const MIN_LOG_PROBABILITY: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Scorecard data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetSummary {
    pub count: usize,
    /// Sum of absolute stakes.
    pub staked: f64,
    pub pnl: f64,
    pub mean_odds: f64,
}

impl BetSummary {
    fn from_bets<'a>(bets: impl Iterator<Item = &'a Bet>) -> Self {
        let mut s = BetSummary::default();
        let mut odds_sum = 0.0;
        for bet in bets {
            s.count += 1;
            s.staked += bet.stake.abs();
            s.pnl += bet.pnl.unwrap_or(0.0);
            odds_sum += bet.odds;
        }
        if s.count > 0 {
            s.mean_odds = odds_sum / s.count as f64;
        }
        s
    }
}

/// One market's bets taken together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketResult {
    pub market_id: String,
    pub scheduled_off: DateTime<Utc>,
    pub course: String,
    pub country: String,
    pub n_runners: usize,
    pub bets: usize,
    pub pnl_gross: f64,
    /// Gross less commission when the market was won.
    pub pnl_net: f64,
    /// Worst payoff over every possible winner.
    pub collateral: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub gross: f64,
    pub net: f64,
    pub gross_cumulative: f64,
    pub net_cumulative: f64,
}

/// Sum of log-probabilities given to winners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogLikelihood {
    pub races: usize,
    pub model: f64,
    pub implied: f64,
    pub uniform: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub commission: f64,
    pub all: BetSummary,
    pub backs: BetSummary,
    pub lays: BetSummary,
    pub markets: Vec<MarketResult>,
    pub daily_pnl: Vec<DailyPnl>,
    pub log_likelihood: LogLikelihood,
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Attach outcomes to every unsettled bet whose race is graded.
///
/// Returns the number of bets settled. A bet on a market that is not in
/// `races` is a data error.
pub fn price_historical_bets(bets: &mut [Bet], races: &[Race]) -> PaddockResult<usize> {
    let by_id: HashMap<&str, &Race> = races.iter().map(|r| (r.market_id.as_str(), r)).collect();
    let mut settled = 0;
    for bet in bets.iter_mut().filter(|b| b.selection_won.is_none()) {
        let race = by_id.get(bet.market_id.as_str()).ok_or_else(|| {
            PaddockError::Data(format!("bet {} refers to unknown market {}", bet.bet_id, bet.market_id))
        })?;
        if !race.is_graded() {
            continue;
        }
        bet.settle(race.is_winner(&bet.runner));
        settled += 1;
    }
    debug!(settled, "Historical bets priced");
    Ok(settled)
}

// ---------------------------------------------------------------------------
// Scorecard
// ---------------------------------------------------------------------------

/// Build the scorecard from settled bets, the races they were placed on,
/// and the decision log (for the likelihood comparison).
pub fn make_scorecard(
    bets: &[Bet],
    races: &[Race],
    records: &[DecisionRecord],
    commission: f64,
) -> PaddockResult<Scorecard> {
    if !(0.0..1.0).contains(&commission) {
        return Err(PaddockError::Configuration(format!(
            "commission must be in [0, 1), got {commission}"
        )));
    }

    let markets = market_breakdown(bets, races, commission)?;
    let daily_pnl = daily_pnl(&markets);
    let log_likelihood = log_likelihood(records, races);

    let scorecard = Scorecard {
        commission,
        all: BetSummary::from_bets(bets.iter()),
        backs: BetSummary::from_bets(bets.iter().filter(|b| b.stake > 0.0)),
        lays: BetSummary::from_bets(bets.iter().filter(|b| b.stake < 0.0)),
        markets,
        daily_pnl,
        log_likelihood,
    };

    info!(
        bets = scorecard.all.count,
        markets = scorecard.markets.len(),
        pnl = format!("£{:.2}", scorecard.all.pnl),
        llik_model = format!("{:.2}", scorecard.log_likelihood.model),
        llik_implied = format!("{:.2}", scorecard.log_likelihood.implied),
        "Scorecard built"
    );
    Ok(scorecard)
}

/// Group bets by market, in scheduled order.
pub fn market_breakdown(
    bets: &[Bet],
    races: &[Race],
    commission: f64,
) -> PaddockResult<Vec<MarketResult>> {
    let by_id: HashMap<&str, &Race> = races.iter().map(|r| (r.market_id.as_str(), r)).collect();
    let mut grouped: HashMap<&str, Vec<&Bet>> = HashMap::new();
    for bet in bets {
        grouped.entry(bet.market_id.as_str()).or_default().push(bet);
    }

    let mut markets = Vec::with_capacity(grouped.len());
    for (market_id, market_bets) in grouped {
        let race = by_id.get(market_id).ok_or_else(|| {
            PaddockError::Data(format!("bets refer to unknown market {market_id}"))
        })?;
        let pnl_gross: f64 = market_bets.iter().map(|b| b.pnl.unwrap_or(0.0)).sum();
        let pnl_net = if pnl_gross > 0.0 {
            pnl_gross * (1.0 - commission)
        } else {
            pnl_gross
        };
        markets.push(MarketResult {
            market_id: market_id.to_string(),
            scheduled_off: race.scheduled_off,
            course: race.course.clone(),
            country: race.country.clone(),
            n_runners: race.n_runners,
            bets: market_bets.len(),
            pnl_gross,
            pnl_net,
            collateral: market_collateral(&market_bets, race.n_runners)?,
        });
    }
    markets.sort_by(|a, b| {
        a.scheduled_off
            .cmp(&b.scheduled_off)
            .then_with(|| a.market_id.cmp(&b.market_id))
    });
    Ok(markets)
}

/// Worst payoff of a market's bets. When some runners carry no bet, their
/// winning is an outcome too: every stake on the others is lost.
fn market_collateral(bets: &[&Bet], n_runners: usize) -> PaddockResult<f64> {
    let stakes: Vec<f64> = bets.iter().map(|b| b.stake).collect();
    let odds: Vec<f64> = bets.iter().map(|b| b.odds).collect();
    let mut worst = bet_returns(&stakes, &odds)?
        .into_iter()
        .fold(f64::INFINITY, f64::min);
    if n_runners > bets.len() {
        worst = worst.min(-stakes.iter().sum::<f64>());
    }
    Ok(worst)
}

fn daily_pnl(markets: &[MarketResult]) -> Vec<DailyPnl> {
    let mut by_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for m in markets {
        let day = by_day.entry(m.scheduled_off.date_naive()).or_default();
        day.0 += m.pnl_gross;
        day.1 += m.pnl_net;
    }

    let (mut gross_cumulative, mut net_cumulative) = (0.0, 0.0);
    by_day
        .into_iter()
        .map(|(date, (gross, net))| {
            gross_cumulative += gross;
            net_cumulative += net;
            DailyPnl {
                date,
                gross,
                net,
                gross_cumulative,
                net_cumulative,
            }
        })
        .collect()
}

/// Log-likelihood of the winners of every priced, graded race.
fn log_likelihood(records: &[DecisionRecord], races: &[Race]) -> LogLikelihood {
    let by_id: HashMap<&str, &Race> = races.iter().map(|r| (r.market_id.as_str(), r)).collect();
    let ln = |p: f64| p.max(MIN_LOG_PROBABILITY).ln();

    let mut llik = LogLikelihood::default();
    for record in records {
        let (Some(pricing), Some(race)) = (&record.pricing, by_id.get(record.market_id.as_str()))
        else {
            continue;
        };
        if !race.is_graded() || pricing.runners.is_empty() {
            continue;
        }
        let uniform = 1.0 / pricing.runners.len() as f64;
        let mut counted = false;
        for (i, runner) in pricing.runners.iter().enumerate() {
            if race.is_winner(runner) {
                llik.model += ln(pricing.model[i]);
                llik.implied += ln(pricing.implied[i]);
                llik.uniform += ln(uniform);
                counted = true;
            }
        }
        if counted {
            llik.races += 1;
        }
    }
    llik
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Decision, RacePricing};
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn race(id: &str, day: u32, hour: u32, winner: &str) -> Race {
        Race {
            market_id: id.into(),
            scheduled_off: Utc.with_ymd_and_hms(2014, 5, day, hour, 0, 0).unwrap(),
            country: "GB".into(),
            course: "Chester".into(),
            event: "5f Hcap".into(),
            selection: vec!["A".into(), "B".into(), "C".into()],
            winners: Some(vec![winner.to_string()]),
            ranking: None,
            n_runners: 3,
            placeholder: false,
        }
    }

    fn bet(market: &str, runner: &str, stake: f64, odds: f64) -> Bet {
        Bet {
            bet_id: format!("{market}/{runner}"),
            market_id: market.into(),
            runner: runner.into(),
            stake,
            odds,
            volume: 100.0,
            model_probability: 0.3,
            implied_probability: 1.0 / odds,
            selection_won: None,
            pnl: None,
        }
    }

    fn settled(races: &[Race]) -> Vec<Bet> {
        let mut bets = vec![
            bet("1.1", "A", 2.0, 3.0),
            bet("1.1", "B", -1.0, 4.0),
            bet("1.2", "C", 1.0, 5.0),
            bet("1.3", "A", -2.0, 2.0),
        ];
        price_historical_bets(&mut bets, races).unwrap();
        bets
    }

    fn races() -> Vec<Race> {
        vec![race("1.1", 1, 14, "A"), race("1.2", 1, 15, "B"), race("1.3", 2, 14, "A")]
    }

    #[test]
    fn test_pricing_settles_against_winners() {
        let races = races();
        let bets = settled(&races);
        assert_eq!(bets[0].pnl, Some(4.0)); // back A won
        assert_eq!(bets[1].pnl, Some(1.0)); // lay B, B lost
        assert_eq!(bets[2].pnl, Some(-1.0)); // back C lost
        assert_eq!(bets[3].pnl, Some(-2.0)); // lay A, A won
    }

    #[test]
    fn test_pricing_skips_settled_and_ungraded() {
        let mut races = races();
        races[2].winners = None;
        let mut bets = settled(&races);
        assert_eq!(bets[3].selection_won, None);
        // Already settled bets are not touched again.
        assert_eq!(price_historical_bets(&mut bets, &races).unwrap(), 0);
    }

    #[test]
    fn test_unknown_market_is_data_error() {
        let mut bets = vec![bet("9.9", "A", 1.0, 2.0)];
        assert!(matches!(
            price_historical_bets(&mut bets, &races()),
            Err(PaddockError::Data(_))
        ));
    }

    #[test]
    fn test_market_breakdown_commission_and_collateral() {
        let races = races();
        let bets = settled(&races);
        let markets = market_breakdown(&bets, &races, DEFAULT_COMMISSION).unwrap();
        assert_eq!(markets.len(), 3);
        assert_eq!(markets[0].market_id, "1.1");

        assert_relative_eq!(markets[0].pnl_gross, 5.0);
        assert_relative_eq!(markets[0].pnl_net, 4.75);
        // Outcomes: A wins 2*2 + 1 = 5, B wins -2 - 3 = -5, C wins -2 + 1 = -1.
        assert_relative_eq!(markets[0].collateral, -5.0);

        // Losing markets pay no commission.
        assert_relative_eq!(markets[2].pnl_net, -2.0);
    }

    #[test]
    fn test_summaries_and_daily_pnl() {
        let races = races();
        let bets = settled(&races);
        let card = make_scorecard(&bets, &races, &[], DEFAULT_COMMISSION).unwrap();

        assert_eq!(card.all.count, 4);
        assert_eq!(card.backs.count, 2);
        assert_eq!(card.lays.count, 2);
        assert_relative_eq!(card.all.staked, 6.0);
        assert_relative_eq!(card.all.pnl, 2.0);
        assert_relative_eq!(card.backs.mean_odds, 4.0);

        assert_eq!(card.daily_pnl.len(), 2);
        assert_relative_eq!(card.daily_pnl[0].gross, 4.0);
        assert_relative_eq!(card.daily_pnl[0].net, 3.75);
        assert_relative_eq!(card.daily_pnl[1].gross_cumulative, 2.0);
        assert_relative_eq!(card.daily_pnl[1].net_cumulative, 1.75);
    }

    #[test]
    fn test_log_likelihood_compares_model_with_market() {
        let races = races();
        let record = DecisionRecord {
            market_id: "1.1".into(),
            scheduled_off: races[0].scheduled_off,
            decision: Decision::NoStake,
            pricing: Some(RacePricing {
                runners: vec!["A".into(), "B".into(), "C".into()],
                odds: vec![2.0, 4.0, 4.0],
                implied: vec![0.5, 0.25, 0.25],
                model: vec![0.6, 0.2, 0.2],
                stakes: vec![0.0; 3],
            }),
            rating_updated: true,
        };
        let unpriced = DecisionRecord {
            market_id: "1.2".into(),
            pricing: None,
            ..record.clone()
        };
        let card = make_scorecard(&[], &races, &[record, unpriced], DEFAULT_COMMISSION).unwrap();
        let llik = card.log_likelihood;
        assert_eq!(llik.races, 1);
        assert_relative_eq!(llik.model, 0.6_f64.ln());
        assert_relative_eq!(llik.implied, 0.5_f64.ln());
        assert_relative_eq!(llik.uniform, (1.0_f64 / 3.0).ln());
        assert!(llik.model > llik.implied);
    }

    #[test]
    fn test_bad_commission_rejected() {
        assert!(matches!(
            make_scorecard(&[], &[], &[], 1.5),
            Err(PaddockError::Configuration(_))
        ));
    }
}
