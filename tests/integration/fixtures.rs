//! Shared race fixtures.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::subscriber::DefaultGuard;

use paddock::rating::TrueSkillConfig;
use paddock::storage::RaceStore;
use paddock::strategy::{StrategyOrchestrator, StrategyParams};
use paddock::types::{Quote, Race};

pub const FIELD: [&str; 4] = ["Kauto Star", "Denman", "Imperial Commander", "Long Run"];

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 3, 1, 15, 30, 0).unwrap() + Duration::days(n)
}

/// A graded race over `runners`; the first listed runner wins.
pub fn race(market_id: &str, off: DateTime<Utc>, runners: &[&str]) -> Race {
    Race {
        market_id: market_id.into(),
        scheduled_off: off,
        country: "GB".into(),
        course: "Cheltenham".into(),
        event: "3m2f Gd1 Chs".into(),
        selection: runners.iter().map(|r| r.to_string()).collect(),
        winners: Some(vec![runners[0].to_string()]),
        ranking: Some((0..runners.len() as u32).collect()),
        n_runners: runners.len(),
        placeholder: false,
    }
}

pub fn quote(market_id: &str, runner: &str, odds: f64) -> Quote {
    Quote {
        market_id: market_id.into(),
        runner: runner.into(),
        odds,
        volume: 1_000.0,
    }
}

/// Twelve daily races. Finishing order rotates so that "Kauto Star" wins
/// most often; every runner is quoted at 4.0.
pub fn season() -> Vec<(Race, Vec<Quote>)> {
    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [0, 2, 1, 3], [1, 0, 3, 2], [0, 3, 1, 2]];
    (0..12)
        .map(|i| {
            let market_id = format!("1.2{:02}", i);
            let order = orders[i % orders.len()];
            let runners: Vec<&str> = order.iter().map(|&k| FIELD[k]).collect();
            let quotes = FIELD.iter().map(|r| quote(&market_id, r, 4.0)).collect();
            (race(&market_id, day(i as i64), &runners), quotes)
        })
        .collect()
}

pub async fn seeded_store() -> RaceStore {
    let store = RaceStore::connect("sqlite::memory:").await.unwrap();
    for (race, quotes) in season() {
        store.insert_race(&race).await.unwrap();
        for q in &quotes {
            store.insert_quote(q).await.unwrap();
        }
    }
    store
}

pub fn strategy(params: StrategyParams) -> StrategyOrchestrator {
    StrategyOrchestrator::new(params, TrueSkillConfig::default()).unwrap()
}

pub fn temp_path(tag: &str) -> String {
    std::env::temp_dir()
        .join(format!("paddock_it_{tag}_{}.json", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

/// JSON log output captured on the current thread.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .filter(|l| l.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

pub fn capture_logs() -> (DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}
