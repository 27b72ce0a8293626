//! Gaussian primitives for the rating factor graph.
//!
//! Messages are stored in natural parameters (precision `pi` and
//! precision-adjusted mean `tau`) so that products and quotients of
//! Gaussians are additions and subtractions.

use std::f64::consts::{PI, SQRT_2};
use std::ops::{Div, Mul};

/// Gaussian in natural parameters. `pi == 0` is the uniform message.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Gaussian {
    pub pi: f64,
    pub tau: f64,
}

impl Gaussian {
    pub fn from_mu_sigma(mu: f64, sigma: f64) -> Self {
        let pi = 1.0 / (sigma * sigma);
        Self { pi, tau: pi * mu }
    }

    pub fn from_mu_variance(mu: f64, variance: f64) -> Self {
        let pi = 1.0 / variance;
        Self { pi, tau: pi * mu }
    }

    pub fn uniform() -> Self {
        Self::default()
    }

    pub fn mu(&self) -> f64 {
        if self.pi == 0.0 {
            0.0
        } else {
            self.tau / self.pi
        }
    }

    pub fn sigma(&self) -> f64 {
        if self.pi == 0.0 {
            f64::INFINITY
        } else {
            (1.0 / self.pi).sqrt()
        }
    }

    /// Variance, infinite for the uniform message.
    pub fn variance(&self) -> f64 {
        if self.pi == 0.0 {
            f64::INFINITY
        } else {
            1.0 / self.pi
        }
    }

    /// Convergence distance used by the message-passing schedule.
    pub fn delta(&self, other: &Gaussian) -> f64 {
        let pi_delta = (self.pi - other.pi).abs();
        if pi_delta.is_infinite() {
            return 0.0;
        }
        (self.tau - other.tau).abs().max(pi_delta.sqrt())
    }
}

impl Mul for Gaussian {
    type Output = Gaussian;

    fn mul(self, rhs: Gaussian) -> Gaussian {
        Gaussian {
            pi: self.pi + rhs.pi,
            tau: self.tau + rhs.tau,
        }
    }
}

impl Div for Gaussian {
    type Output = Gaussian;

    fn div(self, rhs: Gaussian) -> Gaussian {
        Gaussian {
            pi: self.pi - rhs.pi,
            tau: self.tau - rhs.tau,
        }
    }
}

// ---------------------------------------------------------------------------
// Standard normal helpers
// ---------------------------------------------------------------------------

/// Complementary error function (Chebyshev fit, relative error < 1.2e-7).
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + z / 2.0);
    let r = t
        * (-z * z - 1.265_512_23
            + t * (1.000_023_68
                + t * (0.374_091_96
                    + t * (0.096_784_18
                        + t * (-0.186_288_06
                            + t * (0.278_868_07
                                + t * (-1.135_203_98
                                    + t * (1.488_515_87
                                        + t * (-0.822_152_23 + t * 0.170_872_77)))))))))
            .exp();
    if x < 0.0 {
        2.0 - r
    } else {
        r
    }
}

/// Inverse of `erfc`, refined with two Newton steps.
pub fn erfcinv(y: f64) -> f64 {
    if y >= 2.0 {
        return -100.0;
    }
    if y <= 0.0 {
        return 100.0;
    }
    let zero_point = y < 1.0;
    let y = if zero_point { y } else { 2.0 - y };
    let t = (-2.0 * (y / 2.0).ln()).sqrt();
    let mut x = -0.70711 * ((2.30753 + t * 0.27061) / (1.0 + t * (0.99229 + t * 0.04481)) - t);
    for _ in 0..2 {
        let err = erfc(x) - y;
        x += err / (1.128_379_167_095_512_6 * (-(x * x)).exp() - x * err);
    }
    if zero_point {
        x
    } else {
        -x
    }
}

/// Normal density.
pub fn pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma.abs();
    (-(z * z) / 2.0).exp() / ((2.0 * PI).sqrt() * sigma.abs())
}

/// Normal cumulative distribution.
pub fn cdf(x: f64, mu: f64, sigma: f64) -> f64 {
    0.5 * erfc(-(x - mu) / (sigma * SQRT_2))
}

/// Normal quantile.
pub fn ppf(p: f64, mu: f64, sigma: f64) -> f64 {
    mu - sigma * SQRT_2 * erfcinv(2.0 * p)
}

pub fn std_pdf(x: f64) -> f64 {
    pdf(x, 0.0, 1.0)
}

pub fn std_cdf(x: f64) -> f64 {
    cdf(x, 0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Truncated Gaussian corrections
// ---------------------------------------------------------------------------

/// Mean correction for a win (`diff > margin`).
pub fn v_win(diff: f64, margin: f64) -> f64 {
    let x = diff - margin;
    let denom = std_cdf(x);
    if denom > 0.0 {
        std_pdf(x) / denom
    } else {
        -x
    }
}

/// Variance correction for a win. Clamped into (0, 1) where the tails underflow.
pub fn w_win(diff: f64, margin: f64) -> f64 {
    let x = diff - margin;
    let v = v_win(diff, margin);
    clamp_unit(v * (v + x))
}

/// Mean correction for a draw (`|diff| <= margin`).
pub fn v_draw(diff: f64, margin: f64) -> f64 {
    let abs_diff = diff.abs();
    let a = margin - abs_diff;
    let b = -margin - abs_diff;
    let denom = std_cdf(a) - std_cdf(b);
    let numer = std_pdf(b) - std_pdf(a);
    let v = if denom > 0.0 { numer / denom } else { a };
    if diff < 0.0 {
        -v
    } else {
        v
    }
}

/// Variance correction for a draw.
pub fn w_draw(diff: f64, margin: f64) -> f64 {
    let abs_diff = diff.abs();
    let a = margin - abs_diff;
    let b = -margin - abs_diff;
    let denom = std_cdf(a) - std_cdf(b);
    if denom <= 0.0 {
        return clamp_unit(1.0);
    }
    let v = v_draw(abs_diff, margin);
    clamp_unit(v * v + (a * std_pdf(a) - b * std_pdf(b)) / denom)
}

fn clamp_unit(w: f64) -> f64 {
    const EPS: f64 = 1e-12;
    if w.is_nan() {
        return 1.0 - EPS;
    }
    w.clamp(EPS, 1.0 - EPS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mu_sigma_roundtrip() {
        let g = Gaussian::from_mu_sigma(25.0, 25.0 / 3.0);
        assert_relative_eq!(g.mu(), 25.0, epsilon = 1e-12);
        assert_relative_eq!(g.sigma(), 25.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_has_zero_mean_and_infinite_sigma() {
        let g = Gaussian::uniform();
        assert_eq!(g.mu(), 0.0);
        assert!(g.sigma().is_infinite());
    }

    #[test]
    fn test_product_and_quotient_invert() {
        let a = Gaussian::from_mu_sigma(1.0, 2.0);
        let b = Gaussian::from_mu_sigma(-3.0, 0.5);
        let back = (a * b) / b;
        assert_relative_eq!(back.pi, a.pi, epsilon = 1e-12);
        assert_relative_eq!(back.tau, a.tau, epsilon = 1e-12);
    }

    #[test]
    fn test_cdf_known_values() {
        assert_relative_eq!(std_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_relative_eq!(std_cdf(1.0), 0.841_344_746, epsilon = 1e-6);
        assert_relative_eq!(std_cdf(-1.959_964), 0.025, epsilon = 1e-6);
    }

    #[test]
    fn test_ppf_inverts_cdf() {
        for p in [0.01, 0.1, 0.55, 0.9, 0.999] {
            assert_relative_eq!(std_cdf(ppf(p, 0.0, 1.0)), p, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_pdf_peak() {
        assert_relative_eq!(std_pdf(0.0), 0.398_942_28, epsilon = 1e-8);
    }

    #[test]
    fn test_win_corrections_in_range() {
        for diff in [-8.0, -2.0, 0.0, 1.5, 6.0] {
            let w = w_win(diff, 0.2);
            assert!(w > 0.0 && w < 1.0, "w_win({diff}) = {w}");
            assert!(v_win(diff, 0.2) > 0.0);
        }
    }

    #[test]
    fn test_draw_corrections_in_range() {
        for diff in [-3.0, -0.1, 0.0, 0.1, 3.0] {
            let w = w_draw(diff, 0.5);
            assert!(w > 0.0 && w < 1.0, "w_draw({diff}) = {w}");
        }
        assert_eq!(v_draw(0.0, 0.5), 0.0);
        // A draw pulls the difference back towards zero.
        assert!(v_draw(1.0, 0.5) < 0.0);
        assert!(v_draw(-1.0, 0.5) > 0.0);
    }
}
