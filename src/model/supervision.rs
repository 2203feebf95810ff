//! Calibration line and concentrations sampled inside the chain.
//!
//! A supervised run ties every protein mean to a concentration through
//! `mu = beta0 + beta1 * concentration`. Standards keep their known
//! concentration. The line is a weighted normal regression of the mean
//! peptide effect of each protein on its concentration, with weight
//! `n_peptides / tausq`, and the regression sums are pooled over ranks
//! through [`LineTerms`].

use faer::Mat;

use crate::config::LinePrior;
use crate::utils::{cholesky_lower, matrix_inverse};

use super::SamplerError;

/// Weighted regression sums of `y` on `x`. Summable across ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineTerms {
    pub weight: f64,
    pub weight_x: f64,
    pub weight_xx: f64,
    pub weight_y: f64,
    pub weight_xy: f64,
}

impl LineTerms {
    pub const LEN: usize = 5;

    pub fn push(&mut self, weight: f64, x: f64, y: f64) {
        self.weight += weight;
        self.weight_x += weight * x;
        self.weight_xx += weight * x * x;
        self.weight_y += weight * y;
        self.weight_xy += weight * x * y;
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.weight,
            self.weight_x,
            self.weight_xx,
            self.weight_y,
            self.weight_xy,
        ]
    }

    /// # Errors
    ///
    /// Returns `SamplerError::MalformedMessage` if the length is wrong.
    pub fn from_slice(values: &[f64]) -> Result<Self, SamplerError> {
        match *values {
            [weight, weight_x, weight_xx, weight_y, weight_xy] => Ok(Self {
                weight,
                weight_x,
                weight_xx,
                weight_y,
                weight_xy,
            }),
            _ => Err(SamplerError::MalformedMessage {
                expected: Self::LEN,
                found: values.len(),
            }),
        }
    }
}

/// Count, sum and sum of squares of concentrations. Summable across ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConcentrationMoments {
    pub count: f64,
    pub sum: f64,
    pub sum_sq: f64,
}

impl ConcentrationMoments {
    pub const LEN: usize = 3;

    pub fn push(&mut self, concentration: f64) {
        self.count += 1.0;
        self.sum += concentration;
        self.sum_sq = concentration.mul_add(concentration, self.sum_sq);
    }

    /// Sum of squared deviations from `center`.
    #[must_use]
    pub fn squared_deviation(&self, center: f64) -> f64 {
        (self.count * center).mul_add(center, 2.0f64.mul_add(-center * self.sum, self.sum_sq))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.count, self.sum, self.sum_sq]
    }

    /// # Errors
    ///
    /// Returns `SamplerError::MalformedMessage` if the length is wrong.
    pub fn from_slice(values: &[f64]) -> Result<Self, SamplerError> {
        match *values {
            [count, sum, sum_sq] => Ok(Self { count, sum, sum_sq }),
            _ => Err(SamplerError::MalformedMessage {
                expected: Self::LEN,
                found: values.len(),
            }),
        }
    }
}

/// The calibration line and the distribution of unknown concentrations.
/// A precision of zero is a flat prior.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SupervisionParams {
    pub beta: [f64; 2],
    pub mean_concentration: f64,
    pub prec_concentration: f64,
}

/// Normal posterior of the line: mean and lower Cholesky factor of the
/// covariance.
#[derive(Debug, Clone)]
pub struct LinePosterior {
    pub mean: [f64; 2],
    pub chol_cov: Mat<f64>,
}

/// Posterior of the line given the regression sums and independent normal
/// priors on its coefficients.
///
/// # Errors
///
/// Returns `SamplerError::UnidentifiedLine` if the sums and the prior do not
/// pin down both coefficients.
pub fn line_posterior(terms: &LineTerms, prior: &LinePrior) -> Result<LinePosterior, SamplerError> {
    let [prec0, prec1] = prior.prior_prec;
    let precision = Mat::from_fn(2, 2, |row, col| match (row, col) {
        (0, 0) => terms.weight + prec0,
        (1, 1) => terms.weight_xx + prec1,
        _ => terms.weight_x,
    });
    if cholesky_lower(&precision).is_none() {
        return Err(SamplerError::UnidentifiedLine);
    }
    let covariance = matrix_inverse(&precision).map_err(|_| SamplerError::UnidentifiedLine)?;
    let chol_cov = cholesky_lower(&covariance).ok_or(SamplerError::UnidentifiedLine)?;
    let rhs = [
        prec0.mul_add(prior.prior_mean[0], terms.weight_y),
        prec1.mul_add(prior.prior_mean[1], terms.weight_xy),
    ];
    let mean = [
        covariance[(0, 0)].mul_add(rhs[0], covariance[(0, 1)] * rhs[1]),
        covariance[(1, 0)].mul_add(rhs[0], covariance[(1, 1)] * rhs[1]),
    ];
    Ok(LinePosterior { mean, chol_cov })
}

/// Reject a line that cannot be inverted to concentrations.
///
/// # Errors
///
/// Returns `SamplerError::InvalidGlobal` for a non-finite coefficient or a
/// zero slope.
pub fn check_line(beta: [f64; 2]) -> Result<[f64; 2], SamplerError> {
    if !beta[0].is_finite() {
        return Err(SamplerError::InvalidGlobal {
            parameter: "beta0",
            value: beta[0],
        });
    }
    if !(beta[1].is_finite() && beta[1] != 0.0) {
        return Err(SamplerError::InvalidGlobal {
            parameter: "beta1",
            value: beta[1],
        });
    }
    Ok(beta)
}

/// Plug-in mean and precision of the starting concentrations.
///
/// # Errors
///
/// Returns `SamplerError::InvalidGlobal` if the concentrations have no
/// spread.
pub fn initial_concentration_dist(moments: &ConcentrationMoments) -> Result<(f64, f64), SamplerError> {
    let mean = moments.sum / moments.count;
    let variance = moments.squared_deviation(mean) / moments.count;
    let precision = 1.0 / variance;
    if precision > 0.0 && precision.is_finite() && mean.is_finite() {
        Ok((mean, precision))
    } else {
        Err(SamplerError::InvalidGlobal {
            parameter: "prec_concentration",
            value: precision,
        })
    }
}
