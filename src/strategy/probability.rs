//! Win-probability estimation from skill beliefs.
//!
//! Finishing first is a statement about order statistics of all runners at
//! once, so the probabilities cannot be computed per runner in isolation.
//! Two interchangeable estimators are provided: seeded Monte-Carlo and
//! trapezoidal quadrature over a shared performance grid.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::rating::gaussian::{cdf, pdf};
use crate::rating::Rating;
use crate::types::{PaddockError, PaddockResult};

pub const DEFAULT_TOLERANCE: f64 = 1e-3;
pub const DEFAULT_SAMPLES: usize = 20_000;
pub const DEFAULT_SEED: u64 = 0x5EED_0F_F1E1D;
pub const DEFAULT_GRID_POINTS: usize = 2001;
pub const DEFAULT_GRID_WIDTH: f64 = 6.0;

/// Converts runner beliefs into finishing probabilities.
pub trait WinProbabilityEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Probability that each runner finishes in the first `top_k` places.
    /// The result sums to `min(top_k, n)`.
    fn estimate(&self, ratings: &[Rating], top_k: usize) -> PaddockResult<Vec<f64>>;

    fn win_probabilities(&self, ratings: &[Rating]) -> PaddockResult<Vec<f64>> {
        self.estimate(ratings, 1)
    }
}

/// Degenerate cases shared by both estimators.
fn trivial(ratings: &[Rating], top_k: usize) -> PaddockResult<Option<Vec<f64>>> {
    if ratings.is_empty() {
        return Err(PaddockError::Data("no runners to price".into()));
    }
    if top_k == 0 {
        return Err(PaddockError::Configuration("top_k must be at least 1".into()));
    }
    if let Some(bad) = ratings
        .iter()
        .find(|r| !(r.mu.is_finite() && r.sigma.is_finite() && r.sigma >= 0.0))
    {
        return Err(PaddockError::NumericalDegeneracy(format!(
            "invalid belief mu={} sigma={}",
            bad.mu, bad.sigma
        )));
    }
    if top_k >= ratings.len() {
        return Ok(Some(vec![1.0; ratings.len()]));
    }
    Ok(None)
}

/// Check the vector is a valid top-k distribution and renormalise it.
pub fn validate_probabilities(
    probabilities: &mut [f64],
    top_k: usize,
    tolerance: f64,
) -> PaddockResult<()> {
    let target = top_k.min(probabilities.len()) as f64;
    if let Some(bad) = probabilities
        .iter()
        .find(|p| !p.is_finite() || **p < -tolerance || **p > 1.0 + tolerance)
    {
        return Err(PaddockError::NumericalDegeneracy(format!(
            "probability {bad} outside [0, 1]"
        )));
    }
    let total: f64 = probabilities.iter().sum();
    if (total - target).abs() > tolerance {
        return Err(PaddockError::NumericalDegeneracy(format!(
            "probabilities sum to {total:.6}, expected {target}"
        )));
    }
    for p in probabilities.iter_mut() {
        *p = (*p * target / total).clamp(0.0, 1.0);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Monte-Carlo
// ---------------------------------------------------------------------------

/// Samples every runner's performance and counts finishing positions.
///
/// The generator is reseeded on every call so repeated runs over the same
/// data give the same answer.
#[derive(Debug, Clone)]
pub struct MonteCarloEstimator {
    samples: usize,
    seed: u64,
    tolerance: f64,
}

impl MonteCarloEstimator {
    pub fn new(samples: usize, seed: u64, tolerance: f64) -> PaddockResult<Self> {
        if samples == 0 {
            return Err(PaddockError::Configuration(
                "Monte-Carlo needs at least one sample".into(),
            ));
        }
        check_tolerance(tolerance)?;
        Ok(Self {
            samples,
            seed,
            tolerance,
        })
    }
}

impl Default for MonteCarloEstimator {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            seed: DEFAULT_SEED,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Standard normal draw (Box-Muller).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

impl WinProbabilityEstimator for MonteCarloEstimator {
    fn name(&self) -> &'static str {
        "monte_carlo"
    }

    fn estimate(&self, ratings: &[Rating], top_k: usize) -> PaddockResult<Vec<f64>> {
        if let Some(p) = trivial(ratings, top_k)? {
            return Ok(p);
        }
        let n = ratings.len();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut counts = vec![0usize; n];
        let mut perf = vec![0.0; n];
        let mut order: Vec<usize> = (0..n).collect();

        for _ in 0..self.samples {
            for (slot, r) in perf.iter_mut().zip(ratings) {
                *slot = r.mu + r.sigma * standard_normal(&mut rng);
            }
            order.sort_by(|&a, &b| perf[b].total_cmp(&perf[a]));
            for &i in order.iter().take(top_k) {
                counts[i] += 1;
            }
        }

        let mut probabilities: Vec<f64> = counts
            .iter()
            .map(|&c| c as f64 / self.samples as f64)
            .collect();
        validate_probabilities(&mut probabilities, top_k, self.tolerance)?;
        Ok(probabilities)
    }
}

// ---------------------------------------------------------------------------
// Quadrature
// ---------------------------------------------------------------------------

/// Integrates density × probability-of-placing over a shared grid.
#[derive(Debug, Clone)]
pub struct QuadratureEstimator {
    points: usize,
    width: f64,
    tolerance: f64,
}

impl QuadratureEstimator {
    /// `width` is the grid half-span beyond the extreme means, in units of
    /// the largest sigma.
    pub fn new(points: usize, width: f64, tolerance: f64) -> PaddockResult<Self> {
        if points < 3 {
            return Err(PaddockError::Configuration(format!(
                "quadrature grid needs at least 3 points, got {points}"
            )));
        }
        if !(width.is_finite() && width > 0.0) {
            return Err(PaddockError::Configuration(format!(
                "grid width must be positive, got {width}"
            )));
        }
        check_tolerance(tolerance)?;
        Ok(Self {
            points,
            width,
            tolerance,
        })
    }

    fn grid(&self, ratings: &[Rating]) -> PaddockResult<Vec<f64>> {
        let max_sigma = ratings.iter().map(|r| r.sigma).fold(0.0, f64::max);
        if max_sigma <= 0.0 {
            return Err(PaddockError::NumericalDegeneracy(
                "all beliefs have zero spread".into(),
            ));
        }
        let min_mu = ratings.iter().map(|r| r.mu).fold(f64::INFINITY, f64::min);
        let max_mu = ratings.iter().map(|r| r.mu).fold(f64::NEG_INFINITY, f64::max);
        let lo = min_mu - self.width * max_sigma;
        let hi = max_mu + self.width * max_sigma;
        let step = (hi - lo) / (self.points - 1) as f64;
        Ok((0..self.points).map(|i| lo + step * i as f64).collect())
    }
}

impl Default for QuadratureEstimator {
    fn default() -> Self {
        Self {
            points: DEFAULT_GRID_POINTS,
            width: DEFAULT_GRID_WIDTH,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Probability that fewer than `k` of the events occur (Poisson-binomial).
fn fewer_than(probs: impl Iterator<Item = f64>, k: usize) -> f64 {
    // dist[c] = P(exactly c events so far), truncated at k - 1.
    let mut dist = vec![0.0; k];
    dist[0] = 1.0;
    for q in probs {
        for c in (0..k).rev() {
            let stay = dist[c] * (1.0 - q);
            let from_below = if c > 0 { dist[c - 1] * q } else { 0.0 };
            dist[c] = stay + from_below;
        }
    }
    dist.iter().sum()
}

fn trapezoid(xs: &[f64], ys: &[f64]) -> f64 {
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

impl WinProbabilityEstimator for QuadratureEstimator {
    fn name(&self) -> &'static str {
        "quadrature"
    }

    fn estimate(&self, ratings: &[Rating], top_k: usize) -> PaddockResult<Vec<f64>> {
        if let Some(p) = trivial(ratings, top_k)? {
            return Ok(p);
        }
        let grid = self.grid(ratings)?;
        let n = ratings.len();

        // cdfs[j][g]: P(runner j performs below grid[g]).
        let cdfs: Vec<Vec<f64>> = ratings
            .iter()
            .map(|r| grid.iter().map(|&x| point_cdf(x, r)).collect())
            .collect();

        let mut probabilities = Vec::with_capacity(n);
        for (i, r) in ratings.iter().enumerate() {
            if r.sigma == 0.0 {
                // Point mass at mu: evaluate the others directly.
                let beaten = fewer_than(
                    (0..n)
                        .filter(|&j| j != i)
                        .map(|j| 1.0 - point_cdf(r.mu, &ratings[j])),
                    top_k,
                );
                probabilities.push(beaten);
                continue;
            }
            let integrand: Vec<f64> = grid
                .iter()
                .enumerate()
                .map(|(g, &x)| {
                    let density = pdf(x, r.mu, r.sigma);
                    if density == 0.0 {
                        return 0.0;
                    }
                    let others = (0..n).filter(|&j| j != i).map(|j| 1.0 - cdfs[j][g]);
                    density * fewer_than(others, top_k)
                })
                .collect();
            probabilities.push(trapezoid(&grid, &integrand));
        }

        validate_probabilities(&mut probabilities, top_k, self.tolerance)?;
        Ok(probabilities)
    }
}

fn point_cdf(x: f64, r: &Rating) -> f64 {
    if r.sigma == 0.0 {
        if x >= r.mu {
            1.0
        } else {
            0.0
        }
    } else {
        cdf(x, r.mu, r.sigma)
    }
}

fn check_tolerance(tolerance: f64) -> PaddockResult<()> {
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return Err(PaddockError::Configuration(format!(
            "probability tolerance must be positive, got {tolerance}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Serialisable estimator choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorConfig {
    MonteCarlo {
        #[serde(default = "default_samples")]
        samples: usize,
        #[serde(default = "default_seed")]
        seed: u64,
    },
    Quadrature {
        #[serde(default = "default_points")]
        points: usize,
        #[serde(default = "default_width")]
        width: f64,
    },
}

fn default_samples() -> usize {
    DEFAULT_SAMPLES
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_points() -> usize {
    DEFAULT_GRID_POINTS
}
fn default_width() -> f64 {
    DEFAULT_GRID_WIDTH
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig::Quadrature {
            points: DEFAULT_GRID_POINTS,
            width: DEFAULT_GRID_WIDTH,
        }
    }
}

impl EstimatorConfig {
    pub fn build(&self, tolerance: f64) -> PaddockResult<Box<dyn WinProbabilityEstimator>> {
        Ok(match *self {
            EstimatorConfig::MonteCarlo { samples, seed } => {
                Box::new(MonteCarloEstimator::new(samples, seed, tolerance)?)
            }
            EstimatorConfig::Quadrature { points, width } => {
                Box::new(QuadratureEstimator::new(points, width, tolerance)?)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
