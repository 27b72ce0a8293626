//! Persistence layer.
//!
//! Strategy checkpoints and the bet ledger are saved to JSON files; race
//! records and price snapshots are read from SQLite (`race_store`).

pub mod race_store;

pub use race_store::{RaceFilter, RaceStore};

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::strategy::StrategySnapshot;
use crate::types::Bet;

/// Default checkpoint file path.
const DEFAULT_CHECKPOINT_FILE: &str = "paddock_checkpoint.json";

/// Default ledger file path.
const DEFAULT_LEDGER_FILE: &str = "paddock_ledger.json";

/// Write any serialisable value as pretty JSON.
pub fn save_json<T: Serialize>(value: &T, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialise {path}"))?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {path}"))?;
    Ok(())
}

/// Save a strategy checkpoint (parameters + rating state).
pub fn save_checkpoint(snapshot: &StrategySnapshot, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_CHECKPOINT_FILE);
    save_json(snapshot, path)?;
    debug!(
        path,
        runners = snapshot.model.ratings.len(),
        races_fit = snapshot.model.fitted.len(),
        "Checkpoint saved"
    );
    Ok(())
}

/// Load a strategy checkpoint.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_checkpoint(path: Option<&str>) -> Result<Option<StrategySnapshot>> {
    let path = path.unwrap_or(DEFAULT_CHECKPOINT_FILE);

    if !Path::new(path).exists() {
        info!(path, "No checkpoint found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read checkpoint from {path}"))?;
    let snapshot: StrategySnapshot = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse checkpoint from {path}"))?;

    info!(
        path,
        runners = snapshot.model.ratings.len(),
        races_fit = snapshot.model.fitted.len(),
        "Checkpoint loaded from disk"
    );
    Ok(Some(snapshot))
}

/// Delete the checkpoint file.
pub fn delete_checkpoint(path: Option<&str>) -> Result<()> {
    remove_if_exists(path.unwrap_or(DEFAULT_CHECKPOINT_FILE))
}

/// Save the matched-bet ledger.
pub fn save_ledger(bets: &[Bet], path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_LEDGER_FILE);
    save_json(&bets, path)?;
    debug!(path, bets = bets.len(), "Ledger saved");
    Ok(())
}

/// Load the matched-bet ledger; a missing file is an empty ledger.
pub fn load_ledger(path: Option<&str>) -> Result<Vec<Bet>> {
    let path = path.unwrap_or(DEFAULT_LEDGER_FILE);
    if !Path::new(path).exists() {
        return Ok(Vec::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger from {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse ledger from {path}"))
}

pub fn delete_ledger(path: Option<&str>) -> Result<()> {
    remove_if_exists(path.unwrap_or(DEFAULT_LEDGER_FILE))
}

fn remove_if_exists(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::TrueSkillConfig;
    use crate::strategy::{StrategyOrchestrator, StrategyParams};
    use crate::types::Race;
    use chrono::{TimeZone, Utc};

    fn temp_path(kind: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("paddock_test_{kind}_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn fitted_snapshot() -> StrategySnapshot {
        let mut model = crate::rating::SkillRatingModel::new(TrueSkillConfig::default()).unwrap();
        model
            .fit_race(&Race {
                market_id: "1.7".into(),
                scheduled_off: Utc.with_ymd_and_hms(2015, 3, 1, 14, 0, 0).unwrap(),
                country: "IE".into(),
                course: "Naas".into(),
                event: "2m Mdn Hrd".into(),
                selection: vec!["Gort".into(), "Moy".into()],
                winners: Some(vec!["Moy".into()]),
                ranking: None,
                n_runners: 2,
                placeholder: false,
            })
            .unwrap();
        StrategyOrchestrator::with_model(StrategyParams::default(), model)
            .unwrap()
            .export()
    }

    #[test]
    fn test_checkpoint_save_and_load() {
        let path = temp_path("checkpoint");
        let snapshot = fitted_snapshot();
        save_checkpoint(&snapshot, Some(&path)).unwrap();

        let loaded = load_checkpoint(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.params, snapshot.params);
        assert_eq!(loaded.model.fitted, snapshot.model.fitted);
        assert_eq!(loaded.model.ratings.len(), 2);
        assert!(StrategyOrchestrator::import(loaded).is_ok());

        delete_checkpoint(Some(&path)).unwrap();
    }

    #[test]
    fn test_checkpoint_ratings_reload_bit_for_bit() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let horses: Vec<String> = (0..40).map(|i| format!("Horse{i:02}")).collect();
        let mut rng = StdRng::seed_from_u64(11);
        let mut model = crate::rating::SkillRatingModel::new(TrueSkillConfig::default()).unwrap();
        let off = Utc.with_ymd_and_hms(2014, 1, 1, 13, 0, 0).unwrap();
        let field = |i: usize, rng: &mut StdRng| {
            let selection: Vec<String> = horses.choose_multiple(rng, 6).cloned().collect();
            Race {
                market_id: format!("1.{i}"),
                scheduled_off: off + chrono::Duration::hours(i as i64),
                country: "GB".into(),
                course: "Lingfield".into(),
                event: "6f Hcap".into(),
                ranking: Some((0..6).collect()),
                winners: None,
                n_runners: selection.len(),
                selection,
                placeholder: false,
            }
        };
        for i in 0..400 {
            model.fit_race(&field(i, &mut rng)).unwrap();
        }

        let path = temp_path("bits");
        let snapshot = StrategyOrchestrator::with_model(StrategyParams::default(), model)
            .unwrap()
            .export();
        save_checkpoint(&snapshot, Some(&path)).unwrap();
        let loaded = load_checkpoint(Some(&path)).unwrap().unwrap();
        delete_checkpoint(Some(&path)).unwrap();

        assert_eq!(loaded.model.ratings.len(), snapshot.model.ratings.len());
        for (before, after) in snapshot.model.ratings.iter().zip(&loaded.model.ratings) {
            assert_eq!(before.runner, after.runner);
            assert_eq!(before.mu.to_bits(), after.mu.to_bits(), "{}", before.runner);
            assert_eq!(before.sigma.to_bits(), after.sigma.to_bits(), "{}", before.runner);
        }

        // Both copies keep fitting in lockstep.
        let mut original = crate::rating::SkillRatingModel::import(snapshot.model).unwrap();
        let mut resumed = crate::rating::SkillRatingModel::import(loaded.model).unwrap();
        let next = field(400, &mut rng);
        original.fit_race(&next).unwrap();
        resumed.fit_race(&next).unwrap();
        assert_eq!(original.export(), resumed.export());
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let loaded = load_checkpoint(Some("/tmp/paddock_nonexistent_checkpoint_12345.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_checkpoint_is_error() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_checkpoint(Some(&path)).is_err());
        delete_checkpoint(Some(&path)).unwrap();
    }

    #[test]
    fn test_ledger_save_and_load() {
        let path = temp_path("ledger");
        let mut bet = Bet {
            bet_id: "1.7/000000".into(),
            market_id: "1.7".into(),
            runner: "Moy".into(),
            stake: 2.0,
            odds: 3.5,
            volume: 120.0,
            model_probability: 0.35,
            implied_probability: 0.28,
            selection_won: None,
            pnl: None,
        };
        bet.settle(true);
        save_ledger(&[bet.clone()], Some(&path)).unwrap();

        let loaded = load_ledger(Some(&path)).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].bet_id, bet.bet_id);
        assert_eq!(loaded[0].selection_won, Some(true));
        assert_eq!(loaded[0].pnl, Some(5.0));

        delete_ledger(Some(&path)).unwrap();
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        assert!(load_ledger(Some("/tmp/paddock_does_not_exist_ledger.json"))
            .unwrap()
            .is_empty());
    }
}
