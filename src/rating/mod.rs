//! Skill rating model: per-runner Gaussian beliefs updated race by race.
//!
//! The store is a plain map keyed by runner. Reads never create entries;
//! only `RatingStore::upsert`, called while fitting a graded race, does.

pub mod gaussian;
pub mod trueskill;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{PaddockError, PaddockResult, Race};
pub use trueskill::{head_to_head, Rating, TrueSkillConfig};

// ---------------------------------------------------------------------------
// Rating store
// ---------------------------------------------------------------------------

/// Belief state of one runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerRating {
    pub runner: String,
    pub mu: f64,
    pub sigma: f64,
    /// Graded races this runner has been fit on.
    pub n_races: u32,
    pub n_wins: u32,
}

impl RunnerRating {
    pub fn new(runner: &str, prior: Rating) -> Self {
        Self {
            runner: runner.to_string(),
            mu: prior.mu,
            sigma: prior.sigma,
            n_races: 0,
            n_wins: 0,
        }
    }

    pub fn rating(&self) -> Rating {
        Rating::new(self.mu, self.sigma)
    }
}

#[derive(Debug, Clone)]
pub struct RatingStore {
    prior: Rating,
    ratings: HashMap<String, RunnerRating>,
}

impl RatingStore {
    pub fn new(prior: Rating) -> Self {
        Self {
            prior,
            ratings: HashMap::new(),
        }
    }

    pub fn get(&self, runner: &str) -> Option<&RunnerRating> {
        self.ratings.get(runner)
    }

    /// Current belief, or the prior for a runner never seen.
    pub fn rating_or_prior(&self, runner: &str) -> Rating {
        self.ratings
            .get(runner)
            .map(RunnerRating::rating)
            .unwrap_or(self.prior)
    }

    /// Fetch the entry for `runner`, inserting it at the prior if absent.
    pub fn upsert(&mut self, runner: &str) -> &mut RunnerRating {
        let prior = self.prior;
        self.ratings
            .entry(runner.to_string())
            .or_insert_with(|| RunnerRating::new(runner, prior))
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunnerRating> {
        self.ratings.values()
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Serialisable image of a [`SkillRatingModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub config: TrueSkillConfig,
    /// Sorted by runner key so snapshots of equal models are identical.
    pub ratings: Vec<RunnerRating>,
    /// Markets already fit.
    pub fitted: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct SkillRatingModel {
    config: TrueSkillConfig,
    store: RatingStore,
    fitted: BTreeSet<String>,
}

impl SkillRatingModel {
    pub fn new(config: TrueSkillConfig) -> PaddockResult<Self> {
        config.validate()?;
        Ok(Self {
            store: RatingStore::new(config.prior()),
            config,
            fitted: BTreeSet::new(),
        })
    }

    pub fn config(&self) -> &TrueSkillConfig {
        &self.config
    }

    pub fn store(&self) -> &RatingStore {
        &self.store
    }

    pub fn races_fit(&self) -> usize {
        self.fitted.len()
    }

    pub fn has_fit(&self, market_id: &str) -> bool {
        self.fitted.contains(market_id)
    }

    /// Commit the outcome of a graded race.
    ///
    /// Returns `Ok(false)` without touching any belief when the race has no
    /// known result, fewer than two runners, or was already fit.
    pub fn fit_race(&mut self, race: &Race) -> PaddockResult<bool> {
        race.validate()?;
        if self.fitted.contains(&race.market_id) {
            debug!(market_id = %race.market_id, "Race already fit, skipping");
            return Ok(false);
        }
        let Some(ranking) = race.effective_ranking() else {
            return Ok(false);
        };
        if race.selection.len() < 2 {
            return Ok(false);
        }

        let priors = self.get_ratings(&race.selection);
        let posteriors = self.config.rate(&priors, &ranking)?;

        for (runner, posterior) in race.selection.iter().zip(&posteriors) {
            let won = race.is_winner(runner);
            let entry = self.store.upsert(runner);
            entry.mu = posterior.mu;
            entry.sigma = posterior.sigma;
            entry.n_races += 1;
            if won {
                entry.n_wins += 1;
            }
        }
        self.fitted.insert(race.market_id.clone());

        if self.fitted.len() % 1000 == 0 {
            info!(
                races = self.fitted.len(),
                runners = self.store.len(),
                "Rating model progress"
            );
        }
        Ok(true)
    }

    /// Beliefs for `runners`; unseen runners get the prior.
    pub fn get_ratings<S: AsRef<str>>(&self, runners: &[S]) -> Vec<Rating> {
        runners
            .iter()
            .map(|r| self.store.rating_or_prior(r.as_ref()))
            .collect()
    }

    /// Graded-race counts for `runners`; unseen runners have 0.
    pub fn get_runs<S: AsRef<str>>(&self, runners: &[S]) -> Vec<u32> {
        runners
            .iter()
            .map(|r| self.store.get(r.as_ref()).map_or(0, |rr| rr.n_races))
            .collect()
    }

    pub fn export(&self) -> ModelSnapshot {
        let mut ratings: Vec<RunnerRating> = self.store.iter().cloned().collect();
        ratings.sort_by(|a, b| a.runner.cmp(&b.runner));
        ModelSnapshot {
            config: self.config.clone(),
            ratings,
            fitted: self.fitted.clone(),
        }
    }

    pub fn import(snapshot: ModelSnapshot) -> PaddockResult<Self> {
        let mut model = Self::new(snapshot.config)?;
        for rating in snapshot.ratings {
            if !(rating.mu.is_finite() && rating.sigma.is_finite() && rating.sigma > 0.0) {
                return Err(PaddockError::Configuration(format!(
                    "snapshot rating for {} is invalid (mu={}, sigma={})",
                    rating.runner, rating.mu, rating.sigma
                )));
            }
            let key = rating.runner.clone();
            *model.store.upsert(&key) = rating;
        }
        model.fitted = snapshot.fitted;
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
