//! Censoring sub-model: intensity-based censoring probabilities, the
//! conditional number of censored states per peptide and the imputation of
//! censored intensities.

use rand::RngExt;
use rand::rngs::StdRng;
use statrs::function::gamma::ln_gamma;

use super::distributions::{
    log_student_t_kernel, sample_bernoulli, sample_normal, sample_student_t, should_accept,
};
use super::likelihood::{GlmLink, clamp_probability, log_add_exp, log_normal_density};
use super::state::NegBinomialParams;
use crate::utils::usize_to_f64;

const BRACKET_HALF_WIDTH_SDS: f64 = 6.0;
const MAX_BRACKET_EXPANSIONS: usize = 60;
const BISECTION_STEPS: usize = 10;
const NEWTON_STEPS: usize = 50;
const MODE_TOLERANCE: f64 = 1.0e-10;
const REJECTION_TRIES: usize = 64;
const FALLBACK_MH_STEPS: usize = 20;
/// Weights this far below the running maximum are treated as zero.
const LOG_WEIGHT_CUTOFF: f64 = 40.0;
const MAX_CENSORED_STATES: u32 = 100_000;

/// Laplace characterization of the intensity-censored density
/// `N(y; mean, variance) * (1 - F(eta0 + eta1 * y))` for one peptide.
#[derive(Debug, Clone, Copy)]
pub struct CensoredIntensity {
    pub link: GlmLink,
    pub eta: [f64; 2],
    pub mean: f64,
    pub variance: f64,
    /// Mode of the censored density.
    pub mode: f64,
    /// Negative second derivative of the log density at the mode.
    pub curvature: f64,
    /// Laplace approximation of `log P(intensity-based censoring)`.
    pub log_p_int_cen: f64,
}

impl CensoredIntensity {
    /// Locate the mode and approximate the censoring probability.
    #[must_use]
    pub fn characterize(link: GlmLink, eta: [f64; 2], mean: f64, variance: f64) -> Self {
        let mut density = Self {
            link,
            eta,
            mean,
            variance,
            mode: mean,
            curvature: 1.0 / variance,
            log_p_int_cen: 0.0,
        };
        density.mode = density.find_mode();
        density.curvature = -density.log_density_derivatives(density.mode).1;
        let curvature = density.curvature.max(f64::MIN_POSITIVE);
        let log_p = 0.5f64.mul_add(
            (std::f64::consts::TAU / curvature).ln(),
            density.log_density(density.mode),
        );
        density.log_p_int_cen = if log_p.is_finite() { log_p.min(0.0) } else { 0.0 };
        density
    }

    #[must_use]
    pub fn p_int_cen(&self) -> f64 {
        self.log_p_int_cen.exp()
    }

    /// Unnormalized log density of the intensity-censored distribution.
    #[must_use]
    pub fn log_density(&self, y: f64) -> f64 {
        log_normal_density(y, self.mean, self.variance)
            + self.link.log_censored(self.eta[1].mul_add(y, self.eta[0]))
    }

    fn log_density_derivatives(&self, y: f64) -> (f64, f64) {
        let (first, second) = self
            .link
            .log_censored_derivatives(self.eta[1].mul_add(y, self.eta[0]));
        (
            self.eta[1].mul_add(first, -(y - self.mean) / self.variance),
            (self.eta[1] * self.eta[1]).mul_add(second, -1.0 / self.variance),
        )
    }

    /// The log density is concave, so its derivative crosses zero exactly
    /// once. Bracket the root, tighten it by bisection and finish with
    /// safeguarded Newton steps.
    fn find_mode(&self) -> f64 {
        let derivative = |y: f64| self.log_density_derivatives(y).0;
        let half_width = BRACKET_HALF_WIDTH_SDS * self.variance.sqrt();
        let mut lower = self.mean - half_width;
        let mut upper = self.mean + half_width;
        let mut width = half_width;
        for _ in 0..MAX_BRACKET_EXPANSIONS {
            if derivative(lower) > 0.0 {
                break;
            }
            width *= 2.0;
            lower -= width;
        }
        width = half_width;
        for _ in 0..MAX_BRACKET_EXPANSIONS {
            if derivative(upper) < 0.0 {
                break;
            }
            width *= 2.0;
            upper += width;
        }

        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lower + upper);
            if derivative(mid) > 0.0 {
                lower = mid;
            } else {
                upper = mid;
            }
        }

        let mut y = 0.5 * (lower + upper);
        for _ in 0..NEWTON_STEPS {
            let (first, second) = self.log_density_derivatives(y);
            if first > 0.0 {
                lower = y;
            } else {
                upper = y;
            }
            let mut next = y - first / second;
            if !(next > lower && next < upper) || !next.is_finite() {
                next = 0.5 * (lower + upper);
            }
            let step = (next - y).abs();
            y = next;
            if step < MODE_TOLERANCE * (1.0 + y.abs()) {
                break;
            }
        }
        y
    }

    /// Draw one intensity from the censored density: rejection from the
    /// Normal envelope, then a short independence chain with a Student-t
    /// proposal at the mode if rejection keeps failing.
    pub fn sample(&self, rng: &mut StdRng, prop_df: f64) -> f64 {
        for _ in 0..REJECTION_TRIES {
            let candidate = sample_normal(rng, self.mean, self.variance);
            let log_keep = self
                .link
                .log_censored(self.eta[1].mul_add(candidate, self.eta[0]));
            if should_accept(log_keep, rng) {
                return candidate;
            }
        }

        let scale = 1.0 / self.curvature.max(f64::MIN_POSITIVE).sqrt();
        let log_weight =
            |y: f64| self.log_density(y) - log_student_t_kernel(y, prop_df, self.mode, scale);
        let mut current = self.mode;
        let mut current_weight = log_weight(current);
        for _ in 0..FALLBACK_MH_STEPS {
            let proposal = sample_student_t(rng, prop_df, self.mode, scale);
            let proposal_weight = log_weight(proposal);
            if should_accept(proposal_weight - current_weight, rng) {
                current = proposal;
                current_weight = proposal_weight;
            }
        }
        current
    }
}

/// Probability that a single state of a peptide is censored, either at
/// random or through its intensity.
#[must_use]
pub fn censoring_probability(p_rnd_cen: f64, p_int_cen: f64) -> f64 {
    clamp_probability((1.0 - p_rnd_cen).mul_add(p_int_cen, p_rnd_cen))
}

/// Draw the number of censored states of a peptide with `n_obs` observed
/// states from its exact conditional.
///
/// With `n_states - 1 ~ NegBinomial(r, lmbda)` and each state censored with
/// probability `p_cen`, the weight of `k` censored states is proportional to
/// `NB(n_obs + k - 1) * C(n_obs + k, k) * p_cen^k`. Peptides without observed
/// states must have at least one censored state.
pub fn sample_n_censored(
    rng: &mut StdRng,
    n_obs: usize,
    p_cen: f64,
    n_states_dist: NegBinomialParams,
) -> u32 {
    let n = usize_to_f64(n_obs);
    let r = n_states_dist.r;
    let log_ratio = clamp_probability(n_states_dist.lmbda).ln() + clamp_probability(p_cen).ln();
    let log_weight = |k: u32| {
        let k = f64::from(k);
        ln_gamma(n + k - 1.0 + r) + (n + k).ln() - ln_gamma(k + 1.0) + k * log_ratio
    };

    let k_min = u32::from(n_obs == 0);
    let mut weights = Vec::new();
    let mut max_weight = f64::NEG_INFINITY;
    let mut k = k_min;
    loop {
        let weight = log_weight(k);
        let declining = weights.last().is_some_and(|&last: &f64| weight <= last);
        max_weight = max_weight.max(weight);
        weights.push(weight);
        if (declining && weight < max_weight - LOG_WEIGHT_CUTOFF) || k >= MAX_CENSORED_STATES {
            break;
        }
        k += 1;
    }

    let total = weights
        .iter()
        .fold(f64::NEG_INFINITY, |acc, &weight| log_add_exp(acc, weight));
    let target = rng.random::<f64>().ln() + total;
    let mut cumulative = f64::NEG_INFINITY;
    for (offset, &weight) in weights.iter().enumerate() {
        cumulative = log_add_exp(cumulative, weight);
        if target <= cumulative {
            return k_min + u32::try_from(offset).unwrap_or(u32::MAX);
        }
    }
    k
}

/// Draw one censored state: whether it was censored at random and its
/// intensity.
pub fn sample_censored_state(
    rng: &mut StdRng,
    density: &CensoredIntensity,
    p_rnd_cen: f64,
    prop_df: f64,
) -> (f64, bool) {
    let log_random = p_rnd_cen.ln();
    let log_intensity = (1.0 - p_rnd_cen).ln() + density.log_p_int_cen;
    let p_random = (log_random - log_add_exp(log_random, log_intensity)).exp();
    if sample_bernoulli(rng, p_random) {
        (sample_normal(rng, density.mean, density.variance), true)
    } else {
        (density.sample(rng, prop_df), false)
    }
}
