//! Historical backtest driver.
//!
//! Replays stored races in start-time order through the strategy, fills
//! bets against the stored quotes, then settles and scores the ledger.
//! One configuration per call; sweeps run as separate processes.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::scorecard::{make_scorecard, price_historical_bets, Scorecard, DEFAULT_COMMISSION};
use crate::execution::HistoricalExecutionService;
use crate::storage::{RaceFilter, RaceStore};
use crate::strategy::{DecisionRecord, StrategyOrchestrator, StrategySnapshot};
use crate::types::{Bet, PaddockResult};

/// Everything a backtest produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestOutcome {
    pub records: Vec<DecisionRecord>,
    /// Settled ledger.
    pub bets: Vec<Bet>,
    pub scorecard: Scorecard,
    /// Strategy state after the last race, ready for paper or live trading.
    pub checkpoint: StrategySnapshot,
}

/// Run `strategy` over the races in `store` selected by `filter`.
///
/// The strategy is advanced in place, so a second call over a later date
/// range continues from where this one stopped.
pub async fn run_backtest(
    store: &RaceStore,
    filter: &RaceFilter,
    strategy: &mut StrategyOrchestrator,
) -> PaddockResult<BacktestOutcome> {
    let races = store.load_races(filter).await?;
    info!(
        races = races.len(),
        start = ?filter.start,
        end = ?filter.end,
        "Backtest starting"
    );

    let mut exec = HistoricalExecutionService::new(store.clone());
    let records = strategy.run(&races, &mut exec).await?;

    let mut bets = exec.into_ledger().into_bets();
    price_historical_bets(&mut bets, &races)?;
    let scorecard = make_scorecard(&bets, &races, &records, DEFAULT_COMMISSION)?;

    info!(
        bets = bets.len(),
        pnl = format!("£{:.2}", scorecard.all.pnl),
        runners_rated = strategy.model().store().len(),
        "Backtest complete"
    );

    Ok(BacktestOutcome {
        records,
        bets,
        scorecard,
        checkpoint: strategy.export(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::TrueSkillConfig;
    use crate::strategy::{Decision, StrategyParams};
    use crate::types::{Quote, Race};
    use chrono::{Duration, TimeZone, Utc};

    const FIELD: [&str; 3] = ["Dominant", "Plodder", "Trier"];

    /// `n` races on consecutive days that "Dominant" always wins, each
    /// quoted at 3.0 for every runner.
    async fn seeded_store(n: usize) -> RaceStore {
        let store = RaceStore::connect("sqlite::memory:").await.unwrap();
        let base = Utc.with_ymd_and_hms(2014, 4, 1, 14, 0, 0).unwrap();
        for i in 0..n {
            let market_id = format!("1.{}", 100 + i);
            store
                .insert_race(&Race {
                    market_id: market_id.clone(),
                    scheduled_off: base + Duration::days(i as i64),
                    country: "GB".into(),
                    course: "Ascot".into(),
                    event: "1m Stks".into(),
                    selection: FIELD.iter().map(|s| s.to_string()).collect(),
                    winners: Some(vec!["Dominant".into()]),
                    ranking: None,
                    n_runners: 3,
                    placeholder: false,
                })
                .await
                .unwrap();
            for runner in FIELD {
                store
                    .insert_quote(&Quote {
                        market_id: market_id.clone(),
                        runner: runner.into(),
                        odds: 3.0,
                        volume: 250.0,
                    })
                    .await
                    .unwrap();
            }
        }
        store
    }

    fn strategy() -> StrategyOrchestrator {
        StrategyOrchestrator::new(StrategyParams::default(), TrueSkillConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_backtest_bets_once_history_exists() {
        let store = seeded_store(6).await;
        let mut strategy = strategy();
        let outcome = run_backtest(&store, &RaceFilter::default(), &mut strategy)
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 6);
        // Three races of history before the first bet.
        for record in &outcome.records[..3] {
            assert!(matches!(record.decision, Decision::Skipped { .. }));
        }
        assert!(outcome.records[3..]
            .iter()
            .all(|r| matches!(r.decision, Decision::Submitted { .. })));

        assert!(outcome.bets.iter().all(|b| b.selection_won.is_some()));
        let dominant: Vec<&Bet> = outcome.bets.iter().filter(|b| b.runner == "Dominant").collect();
        assert_eq!(dominant.len(), 3);
        assert!(dominant.iter().all(|b| b.stake > 0.0));
        assert!(outcome.scorecard.all.pnl > 0.0);
        assert_eq!(outcome.scorecard.log_likelihood.races, 3);
        assert!(outcome.scorecard.log_likelihood.model > outcome.scorecard.log_likelihood.uniform);

        assert_eq!(outcome.checkpoint.model.fitted.len(), 6);
    }

    #[tokio::test]
    async fn test_backtest_resumes_over_later_range() {
        let store = seeded_store(6).await;
        let split = Utc.with_ymd_and_hms(2014, 4, 4, 0, 0, 0).unwrap();

        let mut strategy = strategy();
        let first = run_backtest(
            &store,
            &RaceFilter {
                end: Some(split),
                ..RaceFilter::default()
            },
            &mut strategy,
        )
        .await
        .unwrap();
        assert_eq!(first.records.len(), 3);
        assert!(first.bets.is_empty());

        let mut resumed = StrategyOrchestrator::import(first.checkpoint).unwrap();
        let second = run_backtest(
            &store,
            &RaceFilter {
                start: Some(split),
                ..RaceFilter::default()
            },
            &mut resumed,
        )
        .await
        .unwrap();
        assert_eq!(second.records.len(), 3);
        assert_eq!(second.bets.iter().filter(|b| b.runner == "Dominant").count(), 3);
    }

    #[tokio::test]
    async fn test_empty_range_is_empty_outcome() {
        let store = seeded_store(2).await;
        let filter = RaceFilter {
            countries: vec!["FR".into()],
            ..RaceFilter::default()
        };
        let outcome = run_backtest(&store, &filter, &mut strategy()).await.unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.scorecard.all.count, 0);
    }
}
