//! Risk-adjusted stake sizing for one-winner markets.
//!
//! Maximises `E_p[payoff(w)] - ra * |w|^2`. The expected payoff is linear in
//! `w`, so the optimum is closed-form: `w = r / (2 * ra)` with `r_i` the
//! expected return of a unit stake on runner `i`.

use tracing::debug;

use crate::types::{PaddockError, PaddockResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAdjustedSizer {
    risk_aversion: f64,
}

impl RiskAdjustedSizer {
    pub fn new(risk_aversion: f64) -> PaddockResult<Self> {
        if !(risk_aversion.is_finite() && risk_aversion > 0.0) {
            return Err(PaddockError::Configuration(format!(
                "risk aversion must be positive, got {risk_aversion}"
            )));
        }
        Ok(Self { risk_aversion })
    }

    pub fn risk_aversion(&self) -> f64 {
        self.risk_aversion
    }

    /// Signed stakes (back positive, lay negative) for model probabilities
    /// `p` against decimal `odds`.
    pub fn size(&self, p: &[f64], odds: &[f64]) -> PaddockResult<Vec<f64>> {
        check_odds(odds, p.len())?;
        let r = expected_unit_returns(p, odds);
        let w: Vec<f64> = r.iter().map(|r_i| r_i / (2.0 * self.risk_aversion)).collect();
        if let Some(bad) = w.iter().find(|x| !x.is_finite()) {
            return Err(PaddockError::NumericalDegeneracy(format!(
                "stake sizing produced {bad}"
            )));
        }
        debug!(
            ra = self.risk_aversion,
            stakes = ?w,
            "Stakes sized"
        );
        Ok(w)
    }

    /// Objective value of a stake vector, `r·w - ra·w·w`.
    pub fn utility(&self, p: &[f64], odds: &[f64], w: &[f64]) -> f64 {
        let r = expected_unit_returns(p, odds);
        let ret: f64 = r.iter().zip(w).map(|(a, b)| a * b).sum();
        let penalty: f64 = w.iter().map(|x| x * x).sum();
        ret - self.risk_aversion * penalty
    }
}

/// Row sums of the expected-return matrix: diagonal `p_i (o_i - 1)`,
/// off-diagonal `-p_j`.
fn expected_unit_returns(p: &[f64], odds: &[f64]) -> Vec<f64> {
    (0..p.len())
        .map(|i| {
            let lose: f64 = p
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, p_j)| p_j)
                .sum();
            p[i] * (odds[i] - 1.0) - lose
        })
        .collect()
}

fn check_odds(odds: &[f64], n: usize) -> PaddockResult<()> {
    if odds.len() != n {
        return Err(PaddockError::Data(format!(
            "{} odds for {} runners",
            odds.len(),
            n
        )));
    }
    if let Some(bad) = odds.iter().find(|o| !(o.is_finite() && **o > 1.0)) {
        return Err(PaddockError::Data(format!("odds {bad} are not above 1.0")));
    }
    Ok(())
}

/// Payoff of stake vector `w` for each possible winner.
///
/// Outcome `i` pays `w_i (o_i - 1)` on the winner and `-w_j` on every other
/// runner.
pub fn bet_returns(w: &[f64], odds: &[f64]) -> PaddockResult<Vec<f64>> {
    check_odds(odds, w.len())?;
    let total: f64 = w.iter().sum();
    Ok(w
        .iter()
        .zip(odds)
        .map(|(w_i, o_i)| w_i * (o_i - 1.0) - (total - w_i))
        .collect())
}

/// Worst-case payoff across all outcomes. Negative means money at risk.
pub fn collateral(w: &[f64], odds: &[f64]) -> PaddockResult<f64> {
    let returns = bet_returns(w, odds)?;
    Ok(returns.into_iter().fold(f64::INFINITY, f64::min))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ODDS: [f64; 3] = [2.0, 4.0, 4.0];

    #[test]
    fn test_non_positive_risk_aversion_rejected() {
        assert!(matches!(
            RiskAdjustedSizer::new(0.0),
            Err(PaddockError::Configuration(_))
        ));
        assert!(RiskAdjustedSizer::new(-1.0).is_err());
        assert!(RiskAdjustedSizer::new(f64::NAN).is_err());
    }

    #[test]
    fn test_no_edge_no_bet() {
        let sizer = RiskAdjustedSizer::new(0.1).unwrap();
        let w = sizer.size(&[0.5, 0.25, 0.25], &ODDS).unwrap();
        assert_eq!(w, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_edge_backs_favourite_lays_rest() {
        let sizer = RiskAdjustedSizer::new(0.1).unwrap();
        let w = sizer.size(&[0.6, 0.2, 0.2], &ODDS).unwrap();
        assert_relative_eq!(w[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(w[1], -1.0, epsilon = 1e-9);
        assert_relative_eq!(w[2], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_large_risk_aversion_shrinks_stakes() {
        let p = [0.6, 0.2, 0.2];
        let norm = |ra: f64| {
            let w = RiskAdjustedSizer::new(ra).unwrap().size(&p, &ODDS).unwrap();
            w.iter().map(|x| x * x).sum::<f64>().sqrt()
        };
        assert!(norm(10.0) < norm(0.1));
        assert!(norm(1e9) < 1e-8);
    }

    #[test]
    fn test_closed_form_is_optimal() {
        let sizer = RiskAdjustedSizer::new(0.3).unwrap();
        let p = [0.45, 0.35, 0.2];
        let odds = [2.4, 3.1, 5.5];
        let w = sizer.size(&p, &odds).unwrap();
        let best = sizer.utility(&p, &odds, &w);
        for i in 0..3 {
            for delta in [-0.01, 0.01] {
                let mut nudged = w.clone();
                nudged[i] += delta;
                assert!(sizer.utility(&p, &odds, &nudged) < best);
            }
        }
    }

    #[test]
    fn test_bet_returns_per_outcome() {
        let returns = bet_returns(&[1.0, -1.0, -1.0], &ODDS).unwrap();
        // Favourite wins: +1 on the back and +1 on each lay.
        assert_eq!(returns, vec![3.0, -3.0, -3.0]);
    }

    #[test]
    fn test_collateral_is_worst_case() {
        assert_eq!(collateral(&[1.0, -1.0, -1.0], &ODDS).unwrap(), -3.0);
        assert_eq!(collateral(&[0.0, 0.0, 0.0], &ODDS).unwrap(), 0.0);
    }

    #[test]
    fn test_bad_odds_are_data_errors() {
        let sizer = RiskAdjustedSizer::new(0.1).unwrap();
        assert!(matches!(
            sizer.size(&[0.5, 0.5], &[2.0, 1.0]),
            Err(PaddockError::Data(_))
        ));
        assert!(matches!(
            sizer.size(&[0.5, 0.5], &[2.0]),
            Err(PaddockError::Data(_))
        ));
    }
}
