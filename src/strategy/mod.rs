//! Strategy engine: win probabilities, stake sizing, and the per-race
//! decision pipeline.

pub mod blend;
pub mod probability;
pub mod sizing;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::execution::ExecutionService;
use crate::rating::{ModelSnapshot, SkillRatingModel, TrueSkillConfig};
use crate::types::{Bet, BetInstruction, PaddockError, PaddockResult, Race};
use blend::{implied_probabilities, DeadbandClamp};
use probability::{EstimatorConfig, WinProbabilityEstimator, DEFAULT_TOLERANCE};
use sizing::{collateral, RiskAdjustedSizer};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Quadratic penalty on stake size. Larger = smaller stakes.
    pub risk_aversion: f64,
    /// Every runner must have at least this many graded races.
    pub min_races: u32,
    pub min_runners: usize,
    /// Largest worst-case loss accepted on one race.
    pub max_exposure: f64,
    /// Stakes at or below this magnitude are not sent.
    pub min_stake: f64,
    pub clamp: DeadbandClamp,
    pub estimator: EstimatorConfig,
    /// Allowed deviation of a probability vector's sum from 1.
    pub probability_tolerance: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            risk_aversion: 0.1,
            min_races: 3,
            min_runners: 2,
            max_exposure: 50.0,
            min_stake: 0.01,
            clamp: DeadbandClamp::default(),
            estimator: EstimatorConfig::default(),
            probability_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl StrategyParams {
    pub fn validate(&self) -> PaddockResult<()> {
        if self.min_runners == 0 {
            return Err(PaddockError::Configuration("min_runners must be at least 1".into()));
        }
        if !(self.max_exposure.is_finite() && self.max_exposure >= 0.0) {
            return Err(PaddockError::Configuration(format!(
                "max_exposure must be non-negative, got {}",
                self.max_exposure
            )));
        }
        if !(self.min_stake.is_finite() && self.min_stake >= 0.0) {
            return Err(PaddockError::Configuration(format!(
                "min_stake must be non-negative, got {}",
                self.min_stake
            )));
        }
        self.clamp.validate()
    }
}

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Why a race was not bet on before any pricing happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Placeholder,
    TooFewRunners { runners: usize, min: usize },
    InsufficientHistory { runner: String, races: u32, min: u32 },
}

/// What the betting half of the pipeline decided for one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Skipped { reason: SkipReason },
    /// Malformed race or quotes; nothing was bet.
    DataError { message: String },
    /// Probabilities or stakes failed their sanity checks; nothing was bet.
    Degenerate { message: String },
    /// Worst case loss exceeded the limit; nothing was bet.
    ExposureRejected { collateral: f64, max_exposure: f64 },
    /// Sized, but every stake was below the minimum.
    NoStake,
    Submitted { bets: Vec<Bet>, collateral: f64 },
}

/// Prices the betting decision was made at, parallel to the race selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacePricing {
    pub runners: Vec<String>,
    pub odds: Vec<f64>,
    pub implied: Vec<f64>,
    /// Model probabilities after the deadband clamp.
    pub model: Vec<f64>,
    pub stakes: Vec<f64>,
}

/// Everything that happened to one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub market_id: String,
    pub scheduled_off: DateTime<Utc>,
    pub decision: Decision,
    /// Set once quotes and probabilities were available.
    #[serde(default)]
    pub pricing: Option<RacePricing>,
    /// Whether the race result was committed to the rating model.
    pub rating_updated: bool,
}

/// Orchestrator parameters and rating state, checkpointed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    pub params: StrategyParams,
    pub model: ModelSnapshot,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs eligibility → quotes → probabilities → stakes → exposure gate →
/// submission → rating update, one race at a time in start-time order.
///
/// The rating update always comes after the betting decision so a race's
/// own result never informs the price it was bet at.
pub struct StrategyOrchestrator {
    params: StrategyParams,
    model: SkillRatingModel,
    estimator: Box<dyn WinProbabilityEstimator>,
    sizer: RiskAdjustedSizer,
}

impl StrategyOrchestrator {
    pub fn new(params: StrategyParams, rating: TrueSkillConfig) -> PaddockResult<Self> {
        let model = SkillRatingModel::new(rating)?;
        Self::with_model(params, model)
    }

    /// Start from an already fitted model.
    pub fn with_model(params: StrategyParams, model: SkillRatingModel) -> PaddockResult<Self> {
        params.validate()?;
        let estimator = params.estimator.build(params.probability_tolerance)?;
        let sizer = RiskAdjustedSizer::new(params.risk_aversion)?;
        Ok(Self {
            params,
            model,
            estimator,
            sizer,
        })
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn model(&self) -> &SkillRatingModel {
        &self.model
    }

    pub fn export(&self) -> StrategySnapshot {
        StrategySnapshot {
            params: self.params.clone(),
            model: self.model.export(),
        }
    }

    pub fn import(snapshot: StrategySnapshot) -> PaddockResult<Self> {
        let model = SkillRatingModel::import(snapshot.model)?;
        Self::with_model(snapshot.params, model)
    }

    /// Process races in scheduled order.
    ///
    /// Bad races are recorded and skipped. An exchange failure stops the run
    /// before the failing race is rated, so the caller can resume from a
    /// checkpoint.
    pub async fn run(
        &mut self,
        races: &[Race],
        exec: &mut dyn ExecutionService,
    ) -> PaddockResult<Vec<DecisionRecord>> {
        let mut ordered: Vec<&Race> = races.iter().collect();
        ordered.sort_by_key(|r| r.scheduled_off);

        info!(
            races = ordered.len(),
            backend = exec.name(),
            estimator = self.estimator.name(),
            "Strategy run starting"
        );

        let mut seen: HashSet<&str> = HashSet::new();
        let mut records = Vec::with_capacity(ordered.len());
        for race in ordered {
            if !seen.insert(race.market_id.as_str()) {
                let message = format!("duplicate market id {}", race.market_id);
                warn!(market_id = %race.market_id, decision = "data_error", "{message}");
                records.push(DecisionRecord {
                    market_id: race.market_id.clone(),
                    scheduled_off: race.scheduled_off,
                    decision: Decision::DataError { message },
                    pricing: None,
                    rating_updated: false,
                });
                continue;
            }
            records.push(self.process_race(race, exec).await?);
        }

        let submitted = records
            .iter()
            .filter(|r| matches!(r.decision, Decision::Submitted { .. }))
            .count();
        let rated = records.iter().filter(|r| r.rating_updated).count();
        info!(
            races = records.len(),
            submitted,
            rated,
            "Strategy run complete"
        );
        Ok(records)
    }

    /// Decide, bet and rate one race.
    pub async fn process_race(
        &mut self,
        race: &Race,
        exec: &mut dyn ExecutionService,
    ) -> PaddockResult<DecisionRecord> {
        let record = |decision, pricing, rating_updated| DecisionRecord {
            market_id: race.market_id.clone(),
            scheduled_off: race.scheduled_off,
            decision,
            pricing,
            rating_updated,
        };

        if race.is_placeholder() {
            debug!(market_id = %race.market_id, "Placeholder market skipped");
            return Ok(record(
                Decision::Skipped {
                    reason: SkipReason::Placeholder,
                },
                None,
                false,
            ));
        }
        if let Err(e) = race.validate() {
            warn!(market_id = %race.market_id, decision = "data_error", error = %e, "Race skipped");
            return Ok(record(
                Decision::DataError {
                    message: e.to_string(),
                },
                None,
                false,
            ));
        }

        let mut pricing = None;
        let decision = match self.decide(race, exec, &mut pricing).await {
            Ok(d) => d,
            Err(e @ PaddockError::ExternalService { .. }) => {
                error!(
                    market_id = %race.market_id,
                    decision = "external_service",
                    error = %e,
                    "Execution service failed, stopping run"
                );
                return Err(e);
            }
            Err(PaddockError::NumericalDegeneracy(message)) => {
                error!(
                    market_id = %race.market_id,
                    decision = "numerical_degeneracy",
                    error = %message,
                    "Betting skipped"
                );
                Decision::Degenerate { message }
            }
            Err(e) => {
                warn!(market_id = %race.market_id, decision = "data_error", error = %e, "Betting skipped");
                Decision::DataError {
                    message: e.to_string(),
                }
            }
        };

        let rating_updated = if race.is_graded() {
            match self.model.fit_race(race) {
                Ok(updated) => updated,
                Err(e) => {
                    error!(market_id = %race.market_id, error = %e, "Rating update failed");
                    false
                }
            }
        } else {
            false
        };

        Ok(record(decision, pricing, rating_updated))
    }

    /// The betting half of the pipeline. Does not touch the rating model.
    /// `pricing` is filled in as soon as stakes are known.
    async fn decide(
        &self,
        race: &Race,
        exec: &mut dyn ExecutionService,
        pricing: &mut Option<RacePricing>,
    ) -> PaddockResult<Decision> {
        // Eligibility
        if race.selection.len() < self.params.min_runners {
            return Ok(Decision::Skipped {
                reason: SkipReason::TooFewRunners {
                    runners: race.selection.len(),
                    min: self.params.min_runners,
                },
            });
        }
        let runs = self.model.get_runs(&race.selection);
        if let Some((runner, &races)) = race
            .selection
            .iter()
            .zip(&runs)
            .find(|(_, &n)| n < self.params.min_races)
        {
            debug!(market_id = %race.market_id, runner = %runner, races, "Insufficient history");
            return Ok(Decision::Skipped {
                reason: SkipReason::InsufficientHistory {
                    runner: runner.clone(),
                    races,
                    min: self.params.min_races,
                },
            });
        }

        // Quotes
        let quotes = exec.get_market_prices(&race.market_id).await?;
        let odds = race
            .selection
            .iter()
            .map(|runner| {
                quotes
                    .iter()
                    .find(|q| &q.runner == runner)
                    .map(|q| q.odds)
                    .ok_or_else(|| {
                        PaddockError::Data(format!(
                            "market {}: no quote for {runner}",
                            race.market_id
                        ))
                    })
            })
            .collect::<PaddockResult<Vec<f64>>>()?;
        let implied = implied_probabilities(&odds)?;

        // Probabilities
        let ratings = self.model.get_ratings(&race.selection);
        let model_p = self.estimator.win_probabilities(&ratings)?;
        let p = self.params.clamp.apply(&model_p, &implied);

        // Stakes and exposure
        let stakes = self.sizer.size(&p, &odds)?;
        let worst = collateral(&stakes, &odds)?;
        *pricing = Some(RacePricing {
            runners: race.selection.clone(),
            odds: odds.clone(),
            implied: implied.clone(),
            model: p.clone(),
            stakes: stakes.clone(),
        });
        if worst < -self.params.max_exposure {
            warn!(
                market_id = %race.market_id,
                decision = "exposure_rejected",
                collateral = format!("£{:.2}", worst),
                max_exposure = format!("£{:.2}", self.params.max_exposure),
                "Exposure limit breached, no bets placed"
            );
            return Ok(Decision::ExposureRejected {
                collateral: worst,
                max_exposure: self.params.max_exposure,
            });
        }

        let instructions: Vec<BetInstruction> = race
            .selection
            .iter()
            .enumerate()
            .filter(|&(i, _)| stakes[i].abs() > self.params.min_stake)
            .map(|(i, runner)| BetInstruction {
                runner: runner.clone(),
                stake: stakes[i],
                model_probability: p[i],
                implied_probability: implied[i],
            })
            .collect();
        if instructions.is_empty() {
            debug!(market_id = %race.market_id, "No stake above minimum");
            return Ok(Decision::NoStake);
        }

        // Submission
        let bets = exec
            .place_exchange_bets(&race.market_id, &instructions)
            .await?;
        info!(
            market_id = %race.market_id,
            bets = bets.len(),
            collateral = format!("£{:.2}", worst),
            "Bets submitted"
        );
        Ok(Decision::Submitted {
            bets,
            collateral: worst,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
