use paddock::execution::{HistoricalExecutionService, InMemorySnapshots};
use paddock::strategy::{Decision, StrategyParams};

use crate::fixtures::{capture_logs, day, quote, race, strategy, FIELD};

#[test]
fn test_exposure_limit_blocks_every_bet() {
    tokio_test::block_on(async {
        let params = StrategyParams {
            min_races: 1,
            max_exposure: 0.001,
            min_stake: 0.0,
            ..StrategyParams::default()
        };
        let mut strategy = strategy(params);

        let mut races = Vec::new();
        let mut quotes = Vec::new();
        for i in 0..4 {
            let market_id = format!("1.9{i}");
            races.push(race(&market_id, day(i), &FIELD));
            quotes.extend(FIELD.iter().map(|r| quote(&market_id, r, 4.0)));
        }
        let mut exec = HistoricalExecutionService::new(InMemorySnapshots::from_quotes(quotes));

        let (_guard, logs) = capture_logs();
        let records = strategy.run(&races, &mut exec).await.unwrap();
        assert_eq!(records.len(), 4);
        assert!(records[1..].iter().all(|r| matches!(
            r.decision,
            Decision::ExposureRejected { max_exposure, .. } if max_exposure == 0.001
        )));
        // Rejected races are still priced and still rated.
        assert!(records[1..].iter().all(|r| r.pricing.is_some() && r.rating_updated));
        assert!(exec.ledger().is_empty());

        // One warning per rejected race, naming the market.
        let rejected = logs.lines_with(r#""decision":"exposure_rejected""#);
        assert_eq!(rejected.len(), 3);
        for (line, market) in rejected.iter().zip(["1.91", "1.92", "1.93"]) {
            assert!(line.contains(r#""level":"WARN""#));
            assert!(line.contains(&format!(r#""market_id":"{market}""#)));
        }
    });
}

#[test]
fn test_generous_limit_lets_bets_through() {
    tokio_test::block_on(async {
        let params = StrategyParams {
            min_races: 1,
            ..StrategyParams::default()
        };
        let mut strategy = strategy(params);

        let mut races = Vec::new();
        let mut quotes = Vec::new();
        for i in 0..4 {
            let market_id = format!("1.9{i}");
            races.push(race(&market_id, day(i), &FIELD));
            quotes.extend(FIELD.iter().map(|r| quote(&market_id, r, 4.0)));
        }
        let mut exec = HistoricalExecutionService::new(InMemorySnapshots::from_quotes(quotes));

        let records = strategy.run(&races, &mut exec).await.unwrap();
        assert!(matches!(records[3].decision, Decision::Submitted { .. }));
        assert!(!exec.ledger().is_empty());
    });
}
