use paddock::backtest::run_backtest;
use paddock::storage::{self, RaceFilter};
use paddock::strategy::{Decision, StrategyOrchestrator, StrategyParams};

use crate::fixtures::{day, seeded_store, strategy, temp_path, FIELD};

#[tokio::test]
async fn test_season_backtest_end_to_end() {
    let store = seeded_store().await;
    let mut strategy = strategy(StrategyParams::default());
    let outcome = run_backtest(&store, &RaceFilter::default(), &mut strategy)
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 12);
    assert!(outcome.records.iter().all(|r| r.rating_updated));
    // Records come back in start-time order.
    assert!(outcome
        .records
        .windows(2)
        .all(|w| w[0].scheduled_off <= w[1].scheduled_off));
    // No runner has three races behind it until the fourth race.
    assert!(outcome.records[..3]
        .iter()
        .all(|r| matches!(r.decision, Decision::Skipped { .. })));

    assert!(!outcome.bets.is_empty());
    assert!(outcome.bets.iter().all(|b| b.pnl.is_some()));
    let kauto_backs = outcome
        .bets
        .iter()
        .filter(|b| b.runner == FIELD[0] && b.stake > 0.0)
        .count();
    assert!(kauto_backs > 0);

    let card = &outcome.scorecard;
    assert_eq!(card.all.count, outcome.bets.len());
    assert_eq!(card.backs.count + card.lays.count, card.all.count);
    assert!(card.log_likelihood.races > 0);
    assert!(card.log_likelihood.model.is_finite());

    assert_eq!(outcome.checkpoint.model.fitted.len(), 12);
}

#[tokio::test]
async fn test_replay_is_byte_identical() {
    let mut ledgers = Vec::new();
    for _ in 0..2 {
        let store = seeded_store().await;
        let mut strategy = strategy(StrategyParams::default());
        let outcome = run_backtest(&store, &RaceFilter::default(), &mut strategy)
            .await
            .unwrap();

        let path = temp_path("ledger");
        storage::save_ledger(&outcome.bets, Some(&path)).unwrap();
        ledgers.push(std::fs::read(&path).unwrap());
        storage::delete_ledger(Some(&path)).unwrap();
    }
    assert!(!ledgers[0].is_empty());
    assert_eq!(ledgers[0], ledgers[1]);
}

#[tokio::test]
async fn test_checkpoint_resume_matches_single_run() {
    let store = seeded_store().await;
    let mut whole = strategy(StrategyParams::default());
    let single = run_backtest(&store, &RaceFilter::default(), &mut whole)
        .await
        .unwrap();

    let split = day(6);
    let mut first_half = strategy(StrategyParams::default());
    let first = run_backtest(
        &store,
        &RaceFilter {
            end: Some(split),
            ..RaceFilter::default()
        },
        &mut first_half,
    )
    .await
    .unwrap();

    let path = temp_path("checkpoint");
    storage::save_checkpoint(&first.checkpoint, Some(&path)).unwrap();
    let snapshot = storage::load_checkpoint(Some(&path)).unwrap().unwrap();
    storage::delete_checkpoint(Some(&path)).unwrap();

    let mut resumed = StrategyOrchestrator::import(snapshot).unwrap();
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

    assert_eq!(first.records.len() + second.records.len(), single.records.len());
    assert_eq!(first.bets.len() + second.bets.len(), single.bets.len());
    for (a, b) in first.bets.iter().chain(&second.bets).zip(&single.bets) {
        assert_eq!(a.market_id, b.market_id);
        assert_eq!(a.runner, b.runner);
        assert!((a.stake - b.stake).abs() < 1e-9);
    }
}
