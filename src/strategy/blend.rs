//! Market-implied probabilities and the deadband clamp that keeps model
//! probabilities close to them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{PaddockError, PaddockResult};

/// Normalised inverse odds.
pub fn implied_probabilities(odds: &[f64]) -> PaddockResult<Vec<f64>> {
    if odds.is_empty() {
        return Err(PaddockError::Data("no odds to imply probabilities from".into()));
    }
    if let Some(bad) = odds.iter().find(|o| !(o.is_finite() && **o > 1.0)) {
        return Err(PaddockError::Data(format!("odds {bad} are not above 1.0")));
    }
    let inverse: Vec<f64> = odds.iter().map(|o| 1.0 / o).collect();
    let total: f64 = inverse.iter().sum();
    Ok(inverse.into_iter().map(|x| x / total).collect())
}

/// Trusts the model inside `deadband` of the market; outside it, pulls the
/// model probability into `[q * lower, q * upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeadbandClamp {
    pub deadband: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Default for DeadbandClamp {
    fn default() -> Self {
        Self {
            deadband: 0.1,
            lower: 0.9,
            upper: 1.1,
        }
    }
}

impl DeadbandClamp {
    pub fn validate(&self) -> PaddockResult<()> {
        if !(self.deadband.is_finite() && self.deadband >= 0.0) {
            return Err(PaddockError::Configuration(format!(
                "deadband must be non-negative, got {}",
                self.deadband
            )));
        }
        if !(self.lower.is_finite() && self.upper.is_finite())
            || self.lower <= 0.0
            || self.lower > 1.0
            || self.upper < 1.0
        {
            return Err(PaddockError::Configuration(format!(
                "clamp factors must satisfy 0 < lower <= 1 <= upper, got ({}, {})",
                self.lower, self.upper
            )));
        }
        Ok(())
    }

    /// Clamp `model` towards `implied`, element by element.
    pub fn apply(&self, model: &[f64], implied: &[f64]) -> Vec<f64> {
        model
            .iter()
            .zip(implied)
            .enumerate()
            .map(|(i, (&p, &q))| {
                if (p - q).abs() > self.deadband {
                    let clamped = p.clamp(q * self.lower, q * self.upper);
                    debug!(runner = i, model = p, implied = q, clamped, "Model probability clamped");
                    clamped
                } else {
                    p
                }
            })
            .collect()
    }
}
