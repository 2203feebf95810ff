//! Parameter containers and the flat encodings exchanged between ranks.

use serde::{Deserialize, Serialize};

pub use crate::config::InverseGammaParams;

use super::SamplerError;

/// Negative-binomial distribution of `n_states - 1` per peptide, with
/// `P(x) ∝ Γ(x + r) / x! * (1 - lmbda)^r * lmbda^x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NegBinomialParams {
    pub r: f64,
    pub lmbda: f64,
}

/// Parameters shared by every protein.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalParams {
    pub eta: [f64; 2],
    pub p_rnd_cen: f64,
    pub sigmasq_dist: InverseGammaParams,
    pub tausq_dist: InverseGammaParams,
    pub n_states_dist: NegBinomialParams,
}

/// Global parameters plus the pre-drawn proposal for `r`, as broadcast by
/// the master before every sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalBroadcast {
    pub params: GlobalParams,
    pub r_proposal: f64,
}

impl GlobalBroadcast {
    pub const LEN: usize = 10;

    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        let p = &self.params;
        vec![
            p.eta[0],
            p.eta[1],
            p.p_rnd_cen,
            p.sigmasq_dist.shape,
            p.sigmasq_dist.rate,
            p.tausq_dist.shape,
            p.tausq_dist.rate,
            p.n_states_dist.r,
            p.n_states_dist.lmbda,
            self.r_proposal,
        ]
    }

    /// # Errors
    ///
    /// Returns `SamplerError::MalformedMessage` if the length is wrong.
    pub fn from_slice(values: &[f64]) -> Result<Self, SamplerError> {
        let values: &[f64; Self::LEN] =
            values
                .try_into()
                .map_err(|_| SamplerError::MalformedMessage {
                    expected: Self::LEN,
                    found: values.len(),
                })?;
        Ok(Self {
            params: GlobalParams {
                eta: [values[0], values[1]],
                p_rnd_cen: values[2],
                sigmasq_dist: InverseGammaParams {
                    shape: values[3],
                    rate: values[4],
                },
                tausq_dist: InverseGammaParams {
                    shape: values[5],
                    rate: values[6],
                },
                n_states_dist: NegBinomialParams {
                    r: values[7],
                    lmbda: values[8],
                },
            },
            r_proposal: values[9],
        })
    }
}

/// Sufficient statistics of a set of variances for the inverse-gamma
/// hyperparameter updates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VarianceStats {
    pub count: f64,
    pub sum_log: f64,
    pub sum_inverse: f64,
}

impl VarianceStats {
    pub fn push(&mut self, variance: f64) {
        self.count += 1.0;
        self.sum_log += variance.ln();
        self.sum_inverse += 1.0 / variance;
    }
}

/// Sufficient statistics of `x = n_states - 1` over peptides, including the
/// log-gamma sums at the current and the proposed `r`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CountStats {
    pub n_peptides: f64,
    pub sum_excess: f64,
    pub sum_ln_gamma_current: f64,
    pub sum_ln_gamma_proposal: f64,
}

/// Everything the global updates need from one partition's sweep. Summing
/// these component-wise across ranks gives the cluster-wide statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalSummary {
    pub n_states: f64,
    pub n_rnd_cen: f64,
    pub sigmasq: VarianceStats,
    pub tausq: VarianceStats,
    pub counts: CountStats,
}

impl LocalSummary {
    pub const LEN: usize = 12;

    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.n_states,
            self.n_rnd_cen,
            self.sigmasq.count,
            self.sigmasq.sum_log,
            self.sigmasq.sum_inverse,
            self.tausq.count,
            self.tausq.sum_log,
            self.tausq.sum_inverse,
            self.counts.n_peptides,
            self.counts.sum_excess,
            self.counts.sum_ln_gamma_current,
            self.counts.sum_ln_gamma_proposal,
        ]
    }

    /// # Errors
    ///
    /// Returns `SamplerError::MalformedMessage` if the length is wrong.
    pub fn from_slice(values: &[f64]) -> Result<Self, SamplerError> {
        if values.len() != Self::LEN {
            return Err(SamplerError::MalformedMessage {
                expected: Self::LEN,
                found: values.len(),
            });
        }
        Ok(Self {
            n_states: values[0],
            n_rnd_cen: values[1],
            sigmasq: VarianceStats {
                count: values[2],
                sum_log: values[3],
                sum_inverse: values[4],
            },
            tausq: VarianceStats {
                count: values[5],
                sum_log: values[6],
                sum_inverse: values[7],
            },
            counts: CountStats {
                n_peptides: values[8],
                sum_excess: values[9],
                sum_ln_gamma_current: values[10],
                sum_ln_gamma_proposal: values[11],
            },
        })
    }
}

/// Log-likelihood, gradient and Hessian of the censoring GLM at one `eta`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlmTerms {
    pub log_likelihood: f64,
    pub gradient: [f64; 2],
    /// Upper triangle `[h00, h01, h11]`.
    pub hessian: [f64; 3],
}

impl GlmTerms {
    pub const LEN: usize = 6;

    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.log_likelihood,
            self.gradient[0],
            self.gradient[1],
            self.hessian[0],
            self.hessian[1],
            self.hessian[2],
        ]
    }

    /// # Errors
    ///
    /// Returns `SamplerError::MalformedMessage` if the length is wrong.
    pub fn from_slice(values: &[f64]) -> Result<Self, SamplerError> {
        if values.len() != Self::LEN {
            return Err(SamplerError::MalformedMessage {
                expected: Self::LEN,
                found: values.len(),
            });
        }
        Ok(Self {
            log_likelihood: values[0],
            gradient: [values[1], values[2]],
            hessian: [values[3], values[4], values[5]],
        })
    }

    /// Add the contribution of one state with covariate `y`, given the first
    /// and second derivatives of its log-likelihood in the linear predictor.
    pub fn accumulate(&mut self, log_likelihood: f64, first: f64, second: f64, y: f64) {
        self.log_likelihood += log_likelihood;
        self.gradient[0] += first;
        self.gradient[1] += first * y;
        self.hessian[0] += second;
        self.hessian[1] += second * y;
        self.hessian[2] += second * y * y;
    }
}
