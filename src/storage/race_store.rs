//! SQLite store of race records and price snapshots.
//!
//! Read side of the race collaborator: backtests load races in start-time
//! order and fill bets against the stored quotes. The insert helpers exist
//! so an ingestion job (or a test) can populate the store.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::execution::SnapshotSource;
use crate::types::{PaddockError, PaddockResult, Quote, Race};

/// Which races a backtest reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceFilter {
    /// Inclusive lower bound on the scheduled start.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the scheduled start.
    pub end: Option<DateTime<Utc>>,
    /// Country codes to keep; empty keeps every country.
    pub countries: Vec<String>,
}

#[derive(Clone)]
pub struct RaceStore {
    pool: SqlitePool,
}

fn storage_error(e: sqlx::Error) -> PaddockError {
    PaddockError::Storage(e.to_string())
}

/// Fixed-width UTC timestamps so text order is time order.
fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl RaceStore {
    /// Open (or create) the store at `url`, e.g. `sqlite://races.db` or
    /// `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid race store url {url}"))?
            .create_if_missing(true);
        // An in-memory database lives and dies with its connection.
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open race store {url}"))?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS races (
                market_id TEXT PRIMARY KEY,
                scheduled_off TEXT NOT NULL,
                country TEXT NOT NULL DEFAULT '',
                course TEXT NOT NULL DEFAULT '',
                event TEXT NOT NULL DEFAULT '',
                selection TEXT NOT NULL, -- JSON array of runner keys
                winners TEXT,            -- JSON array, NULL until graded
                ranking TEXT,            -- JSON array parallel to selection
                n_runners INTEGER NOT NULL,
                placeholder INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create races table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_races_scheduled_off ON races (scheduled_off)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to index races table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                market_id TEXT NOT NULL,
                runner TEXT NOT NULL,
                odds REAL NOT NULL,
                volume REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (market_id, runner)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create quotes table")?;

        debug!("Race store tables initialised");
        Ok(())
    }

    // --- Writes ---

    /// Insert or replace a race record.
    pub async fn insert_race(&self, race: &Race) -> PaddockResult<()> {
        let selection = to_json(&race.selection)?;
        let winners = race.winners.as_ref().map(to_json).transpose()?;
        let ranking = race.ranking.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO races
                (market_id, scheduled_off, country, course, event, selection, winners, ranking, n_runners, placeholder)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&race.market_id)
        .bind(encode_time(&race.scheduled_off))
        .bind(&race.country)
        .bind(&race.course)
        .bind(&race.event)
        .bind(selection)
        .bind(winners)
        .bind(ranking)
        .bind(race.n_runners as i64)
        .bind(race.placeholder)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    /// Insert or replace a runner's quote.
    pub async fn insert_quote(&self, quote: &Quote) -> PaddockResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO quotes (market_id, runner, odds, volume) VALUES (?, ?, ?, ?)",
        )
        .bind(&quote.market_id)
        .bind(&quote.runner)
        .bind(quote.odds)
        .bind(quote.volume)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    // --- Reads ---

    /// Races matching `filter`, in scheduled order (market id breaks ties).
    pub async fn load_races(&self, filter: &RaceFilter) -> PaddockResult<Vec<Race>> {
        let rows = sqlx::query(
            r#"
            SELECT market_id, scheduled_off, country, course, event, selection, winners, ranking, n_runners, placeholder
            FROM races
            WHERE (? IS NULL OR scheduled_off >= ?)
              AND (? IS NULL OR scheduled_off < ?)
            ORDER BY scheduled_off, market_id
            "#,
        )
        .bind(filter.start.as_ref().map(encode_time))
        .bind(filter.start.as_ref().map(encode_time))
        .bind(filter.end.as_ref().map(encode_time))
        .bind(filter.end.as_ref().map(encode_time))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut races = Vec::with_capacity(rows.len());
        for row in &rows {
            let race = race_from_row(row)?;
            if filter.countries.is_empty()
                || filter
                    .countries
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&race.country))
            {
                races.push(race);
            }
        }
        info!(races = races.len(), "Races loaded from store");
        Ok(races)
    }

    pub async fn quotes_for(&self, market_id: &str) -> PaddockResult<Vec<Quote>> {
        let rows = sqlx::query(
            "SELECT market_id, runner, odds, volume FROM quotes WHERE market_id = ? ORDER BY runner",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(|row| {
                Ok(Quote {
                    market_id: row.try_get("market_id").map_err(storage_error)?,
                    runner: row.try_get("runner").map_err(storage_error)?,
                    odds: row.try_get("odds").map_err(storage_error)?,
                    volume: row.try_get("volume").map_err(storage_error)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotSource for RaceStore {
    async fn market_quotes(&self, market_id: &str) -> PaddockResult<Vec<Quote>> {
        self.quotes_for(market_id).await
    }
}

fn to_json<T: Serialize>(value: &T) -> PaddockResult<String> {
    serde_json::to_string(value).map_err(|e| PaddockError::Storage(e.to_string()))
}

fn from_json<T: for<'de> Deserialize<'de>>(market_id: &str, column: &str, text: &str) -> PaddockResult<T> {
    serde_json::from_str(text)
        .map_err(|e| PaddockError::Data(format!("market {market_id}: bad {column} column: {e}")))
}

fn race_from_row(row: &SqliteRow) -> PaddockResult<Race> {
    let market_id: String = row.try_get("market_id").map_err(storage_error)?;
    let off: String = row.try_get("scheduled_off").map_err(storage_error)?;
    let scheduled_off = DateTime::parse_from_rfc3339(&off)
        .map_err(|e| PaddockError::Data(format!("market {market_id}: bad start time {off}: {e}")))?
        .with_timezone(&Utc);
    let selection: String = row.try_get("selection").map_err(storage_error)?;
    let winners: Option<String> = row.try_get("winners").map_err(storage_error)?;
    let ranking: Option<String> = row.try_get("ranking").map_err(storage_error)?;
    let n_runners: i64 = row.try_get("n_runners").map_err(storage_error)?;

    Ok(Race {
        scheduled_off,
        country: row.try_get("country").map_err(storage_error)?,
        course: row.try_get("course").map_err(storage_error)?,
        event: row.try_get("event").map_err(storage_error)?,
        selection: from_json(&market_id, "selection", &selection)?,
        winners: winners
            .map(|w| from_json(&market_id, "winners", &w))
            .transpose()?,
        ranking: ranking
            .map(|r| from_json(&market_id, "ranking", &r))
            .transpose()?,
        n_runners: usize::try_from(n_runners).map_err(|_| {
            PaddockError::Data(format!("market {market_id}: negative runner count"))
        })?,
        placeholder: row.try_get("placeholder").map_err(storage_error)?,
        market_id,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn race(id: &str, day: u32, country: &str, winner: Option<&str>) -> Race {
        Race {
            market_id: id.into(),
            scheduled_off: Utc.with_ymd_and_hms(2014, 7, day, 15, 30, 0).unwrap(),
            country: country.into(),
            course: "Galway".into(),
            event: "7f Hcap".into(),
            selection: vec!["Alpha".into(), "Bravo".into()],
            winners: winner.map(|w| vec![w.to_string()]),
            ranking: None,
            n_runners: 2,
            placeholder: false,
        }
    }

    async fn store() -> RaceStore {
        RaceStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_race_roundtrip_preserves_fields() {
        let store = store().await;
        let mut r = race("1.10", 3, "IE", Some("Bravo"));
        r.ranking = Some(vec![1, 0]);
        store.insert_race(&r).await.unwrap();

        let loaded = store.load_races(&RaceFilter::default()).await.unwrap();
        assert_eq!(loaded, vec![r]);
    }

    #[tokio::test]
    async fn test_races_come_back_in_time_order() {
        let store = store().await;
        store.insert_race(&race("1.3", 9, "GB", None)).await.unwrap();
        store.insert_race(&race("1.1", 2, "GB", None)).await.unwrap();
        store.insert_race(&race("1.2", 5, "GB", None)).await.unwrap();

        let ids: Vec<String> = store
            .load_races(&RaceFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.market_id)
            .collect();
        assert_eq!(ids, vec!["1.1", "1.2", "1.3"]);
    }

    #[tokio::test]
    async fn test_filter_by_date_and_country() {
        let store = store().await;
        store.insert_race(&race("1.1", 2, "GB", None)).await.unwrap();
        store.insert_race(&race("1.2", 5, "IE", None)).await.unwrap();
        store.insert_race(&race("1.3", 9, "GB", None)).await.unwrap();

        let filter = RaceFilter {
            start: Some(Utc.with_ymd_and_hms(2014, 7, 3, 0, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2014, 7, 31, 0, 0, 0).unwrap()),
            countries: vec!["gb".into()],
        };
        let races = store.load_races(&filter).await.unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].market_id, "1.3");
    }

    #[tokio::test]
    async fn test_quotes_serve_as_snapshots() {
        let store = store().await;
        for (runner, odds) in [("Alpha", 2.5), ("Bravo", 1.7)] {
            store
                .insert_quote(&Quote {
                    market_id: "1.1".into(),
                    runner: runner.into(),
                    odds,
                    volume: 310.0,
                })
                .await
                .unwrap();
        }
        let quotes = store.market_quotes("1.1").await.unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].runner, "Alpha");
        assert_eq!(quotes[1].odds, 1.7);
        assert!(store.market_quotes("1.9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_selection_is_data_error() {
        let store = store().await;
        store.insert_race(&race("1.1", 2, "GB", None)).await.unwrap();
        sqlx::query("UPDATE races SET selection = 'not json' WHERE market_id = '1.1'")
            .execute(&store.pool)
            .await
            .unwrap();
        assert!(matches!(
            store.load_races(&RaceFilter::default()).await,
            Err(PaddockError::Data(_))
        ));
    }
}
