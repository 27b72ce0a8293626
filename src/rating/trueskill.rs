//! Multi-way Bayesian skill update (TrueSkill family).
//!
//! Every runner is a one-member team. The factor graph is the usual chain:
//! prior → skill → performance → pairwise difference between neighbours in
//! finish order → truncation (win or draw). The difference layer is solved
//! with expectation propagation, sweeping forwards and backwards until the
//! truncation messages stop moving.

use serde::{Deserialize, Serialize};

use super::gaussian::{ppf, std_cdf, v_draw, v_win, w_draw, w_win, Gaussian};
use crate::types::{PaddockError, PaddockResult};

pub const DEFAULT_MU: f64 = 25.0;
pub const DEFAULT_SIGMA: f64 = DEFAULT_MU / 3.0;
pub const DEFAULT_BETA: f64 = DEFAULT_SIGMA / 2.0;
pub const DEFAULT_TAU: f64 = DEFAULT_SIGMA / 100.0;
pub const DEFAULT_DRAW_PROBABILITY: f64 = 0.10;

const MAX_ITERATIONS: usize = 10;
const MIN_DELTA: f64 = 0.0001;

/// Gaussian belief over one runner's latent skill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub mu: f64,
    pub sigma: f64,
}

impl Rating {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }
}

/// Environment of the rating model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrueSkillConfig {
    /// Prior mean for unseen runners.
    pub mu: f64,
    /// Prior uncertainty for unseen runners.
    pub sigma: f64,
    /// Skill gap that gives roughly an 80% chance of finishing ahead.
    pub beta: f64,
    /// Uncertainty added before every observation (skill drift).
    pub tau: f64,
    /// Chance that two neighbours finish level.
    pub draw_probability: f64,
}

impl Default for TrueSkillConfig {
    fn default() -> Self {
        Self {
            mu: DEFAULT_MU,
            sigma: DEFAULT_SIGMA,
            beta: DEFAULT_BETA,
            tau: DEFAULT_TAU,
            draw_probability: DEFAULT_DRAW_PROBABILITY,
        }
    }
}

impl TrueSkillConfig {
    pub fn validate(&self) -> PaddockResult<()> {
        if !self.mu.is_finite() {
            return Err(PaddockError::Configuration(format!("mu must be finite, got {}", self.mu)));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(PaddockError::Configuration(format!(
                "sigma must be positive, got {}",
                self.sigma
            )));
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(PaddockError::Configuration(format!(
                "beta must be positive, got {}",
                self.beta
            )));
        }
        if !(self.tau.is_finite() && self.tau >= 0.0) {
            return Err(PaddockError::Configuration(format!(
                "tau must be non-negative, got {}",
                self.tau
            )));
        }
        if !(0.0..1.0).contains(&self.draw_probability) {
            return Err(PaddockError::Configuration(format!(
                "draw probability must be in [0, 1), got {}",
                self.draw_probability
            )));
        }
        Ok(())
    }

    /// Prior for a runner with no history.
    pub fn prior(&self) -> Rating {
        Rating::new(self.mu, self.sigma)
    }

    /// Performance-difference margin inside which two runners are level.
    pub fn draw_margin(&self) -> f64 {
        if self.draw_probability == 0.0 {
            return 0.0;
        }
        ppf((self.draw_probability + 1.0) / 2.0, 0.0, 1.0) * 2f64.sqrt() * self.beta
    }

    /// Update the beliefs of all runners of one race.
    ///
    /// `ranks` is parallel to `ratings`; lower is better, equal ranks are a
    /// dead heat. The returned ratings are in input order.
    pub fn rate(&self, ratings: &[Rating], ranks: &[u32]) -> PaddockResult<Vec<Rating>> {
        let n = ratings.len();
        if n != ranks.len() {
            return Err(PaddockError::Data(format!(
                "{} ratings but {} ranks",
                n,
                ranks.len()
            )));
        }
        if n < 2 {
            return Err(PaddockError::Data(format!(
                "a race needs at least two runners to rate, got {n}"
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| ranks[i]);

        let beta_sq = self.beta * self.beta;
        let tau_sq = self.tau * self.tau;

        let priors: Vec<Gaussian> = order
            .iter()
            .map(|&i| {
                let r = ratings[i];
                Gaussian::from_mu_variance(r.mu, r.sigma * r.sigma + tau_sq)
            })
            .collect();
        let perf_down: Vec<Gaussian> = priors
            .iter()
            .map(|g| Gaussian::from_mu_variance(g.mu(), g.variance() + beta_sq))
            .collect();
        let ties: Vec<bool> = order
            .windows(2)
            .map(|w| ranks[w[0]] == ranks[w[1]])
            .collect();

        let mut chain = DiffChain::new(perf_down, ties, self.draw_margin());
        chain.solve();

        let mut updated = vec![Rating::new(0.0, 0.0); n];
        for (pos, &i) in order.iter().enumerate() {
            let cavity = chain.perf_marginal(pos) / chain.perf_down[pos];
            let a = 1.0 / (1.0 + beta_sq * cavity.pi);
            let up = Gaussian {
                pi: a * cavity.pi,
                tau: a * cavity.tau,
            };
            let posterior = priors[pos] * up;
            let rating = Rating::new(posterior.mu(), posterior.sigma());
            if !(rating.mu.is_finite() && rating.sigma.is_finite() && rating.sigma > 0.0) {
                return Err(PaddockError::NumericalDegeneracy(format!(
                    "rating update produced mu={} sigma={}",
                    rating.mu, rating.sigma
                )));
            }
            updated[i] = rating;
        }
        Ok(updated)
    }
}

/// Probability that `a` finishes ahead of `b`.
pub fn head_to_head(a: &Rating, b: &Rating) -> f64 {
    let spread = (a.sigma * a.sigma + b.sigma * b.sigma).sqrt();
    if spread == 0.0 {
        return if a.mu > b.mu {
            1.0
        } else if a.mu < b.mu {
            0.0
        } else {
            0.5
        };
    }
    std_cdf((a.mu - b.mu) / spread)
}

// ---------------------------------------------------------------------------
// Difference layer
// ---------------------------------------------------------------------------

/// Messages around the chain `perf[k] - perf[k + 1] = diff[k]`.
struct DiffChain {
    /// Likelihood → performance messages.
    perf_down: Vec<Gaussian>,
    /// Difference factor k → perf[k].
    to_left: Vec<Gaussian>,
    /// Difference factor k → perf[k + 1].
    to_right: Vec<Gaussian>,
    /// Difference factor k → diff[k].
    to_diff: Vec<Gaussian>,
    /// Truncation factor k → diff[k].
    trunc: Vec<Gaussian>,
    ties: Vec<bool>,
    margin: f64,
}

impl DiffChain {
    fn new(perf_down: Vec<Gaussian>, ties: Vec<bool>, margin: f64) -> Self {
        let m = ties.len();
        Self {
            perf_down,
            to_left: vec![Gaussian::uniform(); m],
            to_right: vec![Gaussian::uniform(); m],
            to_diff: vec![Gaussian::uniform(); m],
            trunc: vec![Gaussian::uniform(); m],
            ties,
            margin,
        }
    }

    fn perf_marginal(&self, i: usize) -> Gaussian {
        let mut g = self.perf_down[i];
        if i < self.to_left.len() {
            g = g * self.to_left[i];
        }
        if i > 0 {
            g = g * self.to_right[i - 1];
        }
        g
    }

    fn solve(&mut self) {
        let m = self.ties.len();
        for _ in 0..MAX_ITERATIONS {
            let mut delta: f64 = 0.0;
            if m == 1 {
                self.diff_down(0);
                delta = self.trunc_up(0);
            } else {
                for k in 0..m - 1 {
                    self.diff_down(k);
                    delta = delta.max(self.trunc_up(k));
                    self.diff_up_right(k);
                }
                for k in (1..m).rev() {
                    self.diff_down(k);
                    delta = delta.max(self.trunc_up(k));
                    self.diff_up_left(k);
                }
            }
            if delta <= MIN_DELTA {
                break;
            }
        }
        self.diff_up_left(0);
        self.diff_up_right(m - 1);
    }

    fn diff_down(&mut self, k: usize) {
        let a = self.perf_marginal(k) / self.to_left[k];
        let b = self.perf_marginal(k + 1) / self.to_right[k];
        self.to_diff[k] = weighted_sum(&[(a, 1.0), (b, -1.0)]);
    }

    /// Moment-match the truncated difference; returns how far it moved.
    fn trunc_up(&mut self, k: usize) -> f64 {
        let cavity = self.to_diff[k];
        let old = cavity * self.trunc[k];
        let sqrt_pi = cavity.pi.sqrt();
        let x = cavity.tau / sqrt_pi;
        let margin = self.margin * sqrt_pi;
        let (v, w) = if self.ties[k] {
            (v_draw(x, margin), w_draw(x, margin))
        } else {
            (v_win(x, margin), w_win(x, margin))
        };
        let denom = 1.0 - w;
        let marginal = Gaussian {
            pi: cavity.pi / denom,
            tau: (cavity.tau + sqrt_pi * v) / denom,
        };
        self.trunc[k] = marginal / cavity;
        marginal.delta(&old)
    }

    fn diff_up_left(&mut self, k: usize) {
        let diff = self.trunc[k];
        let b = self.perf_marginal(k + 1) / self.to_right[k];
        self.to_left[k] = weighted_sum(&[(diff, 1.0), (b, 1.0)]);
    }

    fn diff_up_right(&mut self, k: usize) {
        let a = self.perf_marginal(k) / self.to_left[k];
        let diff = self.trunc[k];
        self.to_right[k] = weighted_sum(&[(a, 1.0), (diff, -1.0)]);
    }
}

/// Message for a variable that is a weighted sum of independent Gaussians.
fn weighted_sum(terms: &[(Gaussian, f64)]) -> Gaussian {
    let mut mu = 0.0;
    let mut variance = 0.0;
    for (g, coeff) in terms {
        mu += coeff * g.mu();
        variance += coeff * coeff * g.variance();
    }
    if variance.is_infinite() {
        return Gaussian::uniform();
    }
    Gaussian::from_mu_variance(mu, variance)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::gaussian::std_pdf;
    use approx::assert_relative_eq;

    fn env() -> TrueSkillConfig {
        TrueSkillConfig::default()
    }

    #[test]
    fn test_default_environment_is_valid() {
        assert!(env().validate().is_ok());
    }

    #[test]
    fn test_invalid_sigma_rejected() {
        let cfg = TrueSkillConfig {
            sigma: 0.0,
            ..env()
        };
        assert!(matches!(cfg.validate(), Err(PaddockError::Configuration(_))));
    }

    #[test]
    fn test_invalid_draw_probability_rejected() {
        let cfg = TrueSkillConfig {
            draw_probability: 1.0,
            ..env()
        };
        assert!(matches!(cfg.validate(), Err(PaddockError::Configuration(_))));
    }

    #[test]
    fn test_one_vs_one_win_reference() {
        let r = env().prior();
        let out = env().rate(&[r, r], &[0, 1]).unwrap();
        assert_relative_eq!(out[0].mu, 29.396, epsilon = 1e-3);
        assert_relative_eq!(out[0].sigma, 7.171, epsilon = 1e-3);
        assert_relative_eq!(out[1].mu, 20.604, epsilon = 1e-3);
        assert_relative_eq!(out[1].sigma, 7.171, epsilon = 1e-3);
    }

    #[test]
    fn test_one_vs_one_draw_reference() {
        let r = env().prior();
        let out = env().rate(&[r, r], &[0, 0]).unwrap();
        assert_relative_eq!(out[0].mu, 25.000, epsilon = 1e-3);
        assert_relative_eq!(out[0].sigma, 6.458, epsilon = 1e-3);
        assert_relative_eq!(out[1].mu, 25.000, epsilon = 1e-3);
    }

    #[test]
    fn test_two_runner_update_matches_closed_form() {
        let cfg = TrueSkillConfig {
            draw_probability: 0.0,
            ..env()
        };
        let a = Rating::new(27.0, 5.0);
        let b = Rating::new(24.0, 7.0);
        let out = cfg.rate(&[a, b], &[0, 1]).unwrap();

        let var_a = a.sigma * a.sigma + cfg.tau * cfg.tau;
        let var_b = b.sigma * b.sigma + cfg.tau * cfg.tau;
        let c = (2.0 * cfg.beta * cfg.beta + var_a + var_b).sqrt();
        let t = (a.mu - b.mu) / c;
        let v = std_pdf(t) / std_cdf(t);
        let w = v * (v + t);
        assert_relative_eq!(out[0].mu, a.mu + var_a / c * v, epsilon = 1e-6);
        assert_relative_eq!(out[1].mu, b.mu - var_b / c * v, epsilon = 1e-6);
        assert_relative_eq!(
            out[0].sigma,
            (var_a * (1.0 - var_a / (c * c) * w)).sqrt(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_output_follows_input_order() {
        let r = env().prior();
        let out = env().rate(&[r, r, r], &[2, 0, 1]).unwrap();
        assert!(out[1].mu > out[2].mu);
        assert!(out[2].mu > out[0].mu);
    }

    #[test]
    fn test_multi_runner_sigma_shrinks() {
        let r = env().prior();
        let ratings = vec![r; 8];
        let ranks: Vec<u32> = (0..8).collect();
        let out = env().rate(&ratings, &ranks).unwrap();
        for pair in out.windows(2) {
            assert!(pair[0].mu > pair[1].mu);
        }
        for rating in &out {
            assert!(rating.sigma < r.sigma);
        }
    }

    #[test]
    fn test_winner_vs_field_of_losers() {
        let r = env().prior();
        let out = env().rate(&[r, r, r, r], &[1, 0, 1, 1]).unwrap();
        assert!(out[1].mu > r.mu);
        // Level losers are chained in the graph, so they come out close
        // but not identical.
        for i in [0, 2, 3] {
            assert!(out[i].mu < r.mu);
            assert_relative_eq!(out[i].mu, 23.19, epsilon = 0.01);
            assert!(out[i].sigma < r.sigma);
        }
    }

    #[test]
    fn test_single_runner_rejected() {
        let r = env().prior();
        assert!(matches!(env().rate(&[r], &[0]), Err(PaddockError::Data(_))));
    }

    #[test]
    fn test_rank_length_mismatch_rejected() {
        let r = env().prior();
        assert!(matches!(env().rate(&[r, r], &[0]), Err(PaddockError::Data(_))));
    }

    #[test]
    fn test_zero_draw_probability_has_zero_margin() {
        let cfg = TrueSkillConfig {
            draw_probability: 0.0,
            ..env()
        };
        assert_eq!(cfg.draw_margin(), 0.0);
        assert_relative_eq!(env().draw_margin(), 0.740466, epsilon = 1e-5);
    }

    #[test]
    fn test_head_to_head() {
        let a = Rating::new(30.0, 3.0);
        let b = Rating::new(25.0, 4.0);
        assert_relative_eq!(head_to_head(&a, &b), std_cdf(1.0), epsilon = 1e-12);
        assert_relative_eq!(head_to_head(&a, &b) + head_to_head(&b, &a), 1.0, epsilon = 1e-6);
        assert_relative_eq!(head_to_head(&a, &a), 0.5, epsilon = 1e-7);
    }
}
