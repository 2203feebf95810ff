//! Link functions and numerically stable log-likelihood helpers for the
//! censoring model.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

const EPS_PROBABILITY: f64 = 1.0e-12;
/// Below this argument `log Phi` switches to its asymptotic expansion.
const PROBIT_TAIL: f64 = -30.0;

/// CDF `F` mapping the censoring linear predictor to an observation
/// probability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlmLink {
    #[default]
    Logit,
    Probit,
}

impl GlmLink {
    /// `log F(z)`, the log-probability that a state is observed.
    #[must_use]
    pub fn log_observed(self, z: f64) -> f64 {
        match self {
            Self::Logit => -softplus(-z),
            Self::Probit => log_standard_normal_cdf(z),
        }
    }

    /// `log(1 - F(z))`, the log-probability of intensity-based censoring.
    #[must_use]
    pub fn log_censored(self, z: f64) -> f64 {
        // Both links are symmetric, so 1 - F(z) = F(-z).
        self.log_observed(-z)
    }

    /// First and second derivatives of `log F(z)` in `z`.
    #[must_use]
    pub fn log_observed_derivatives(self, z: f64) -> (f64, f64) {
        match self {
            Self::Logit => {
                let p = logistic_stable(z);
                let q = logistic_stable(-z);
                (q, -p * q)
            }
            Self::Probit => {
                let ratio = (log_standard_normal_pdf(z) - log_standard_normal_cdf(z)).exp();
                (ratio, -ratio * (ratio + z))
            }
        }
    }

    /// First and second derivatives of `log(1 - F(z))` in `z`.
    #[must_use]
    pub fn log_censored_derivatives(self, z: f64) -> (f64, f64) {
        let (first, second) = self.log_observed_derivatives(-z);
        (-first, second)
    }
}

/// Stable logistic transform.
#[must_use]
pub fn logistic_stable(value: f64) -> f64 {
    if value >= 0.0 {
        let z = (-value).exp();
        1.0 / (1.0 + z)
    } else {
        let z = value.exp();
        z / (1.0 + z)
    }
}

/// `log(1 + exp(x))` without overflow.
#[must_use]
pub fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// Bound probability away from exact 0 and 1.
#[must_use]
pub fn clamp_probability(probability: f64) -> f64 {
    probability.clamp(EPS_PROBABILITY, 1.0 - EPS_PROBABILITY)
}

/// Log-density of standard normal.
#[must_use]
pub fn log_standard_normal_pdf(value: f64) -> f64 {
    -0.5 * value.mul_add(value, std::f64::consts::TAU.ln())
}

/// Log-CDF of standard normal, finite far into the lower tail.
#[must_use]
pub fn log_standard_normal_cdf(value: f64) -> f64 {
    if value > PROBIT_TAIL {
        (0.5 * erfc(-value / std::f64::consts::SQRT_2)).ln()
    } else {
        let inv_sq = 1.0 / (value * value);
        let series = (3.0 * inv_sq).mul_add(inv_sq, 1.0 - inv_sq);
        log_standard_normal_pdf(value) - (-value).ln() + series.ln()
    }
}

/// Log-density of `Normal(mean, variance)`.
#[must_use]
pub fn log_normal_density(value: f64, mean: f64, variance: f64) -> f64 {
    if !(variance > 0.0) {
        return f64::NEG_INFINITY;
    }
    let centered = value - mean;
    -0.5 * (std::f64::consts::TAU.ln() + variance.ln() + centered * centered / variance)
}

/// `log(exp(a) + exp(b))`.
#[must_use]
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}
