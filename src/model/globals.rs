//! Updates of the parameters shared by every protein.
//!
//! These run on the rank that owns the global chain and only ever see
//! cluster-wide sufficient statistics, never individual proteins.

use faer::Mat;
use rand::rngs::StdRng;
use statrs::function::gamma::ln_gamma;

use crate::config::{InitialValues, Priors, Settings, VarianceDistPrior};
use crate::inference::{AcceptanceStats, ProposalStats};

use super::SamplerError;
use super::distributions::{
    sample_beta, sample_gamma, sample_normal, sample_standard_normal, sample_t_mixing,
    should_accept,
};
use super::glm::CensoringFit;
use super::priors::{log_gamma_kernel, log_slope_prior};
use super::state::{
    GlobalBroadcast, GlobalParams, InverseGammaParams, LocalSummary, NegBinomialParams,
    VarianceStats,
};
use super::supervision::{ConcentrationMoments, LineTerms, check_line, line_posterior};

const R_BOUNDS: (f64, f64) = (1.0e-2, 1.0e3);
const PROBABILITY_BOUNDS: (f64, f64) = (1.0e-6, 1.0 - 1.0e-6);

/// Owner of the global-parameter random stream.
#[derive(Debug)]
pub struct GlobalUpdater<'a> {
    priors: &'a Priors,
    settings: &'a Settings,
    rng: StdRng,
}

impl<'a> GlobalUpdater<'a> {
    #[must_use]
    pub const fn new(priors: &'a Priors, settings: &'a Settings, rng: StdRng) -> Self {
        Self {
            priors,
            settings,
            rng,
        }
    }

    /// Initial global parameters and the first `r` proposal.
    ///
    /// `moments` are the cluster-wide `[count, sum, sum of squares]` of
    /// `n_obs_states - 1` over observed peptides.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError::InvalidGlobal` if a drawn value is not finite.
    pub fn initial_broadcast(
        &mut self,
        init: &InitialValues,
        moments: [f64; 3],
    ) -> Result<GlobalBroadcast, SamplerError> {
        let z0 = sample_standard_normal(&mut self.rng);
        let z1 = sample_standard_normal(&mut self.rng);
        let cor = init.eta.cor;
        let eta = [
            init.eta.sd[0].mul_add(z0, init.eta.mean[0]),
            init.eta.sd[1].mul_add(
                cor.mul_add(z0, (1.0 - cor * cor).max(0.0).sqrt() * z1),
                init.eta.mean[1],
            ),
        ];
        let params = GlobalParams {
            eta,
            p_rnd_cen: init.p_rnd_cen,
            sigmasq_dist: init.sigmasq_dist,
            tausq_dist: init.tausq_dist,
            n_states_dist: moment_estimate(moments),
        };
        check_globals(&params)?;
        let r_proposal = self.draw_r_proposal(params.n_states_dist.r);
        Ok(GlobalBroadcast { params, r_proposal })
    }

    /// Draw from the bivariate Student-t proposal around the GLM fit.
    pub fn propose_eta(&mut self, fit: &CensoringFit) -> [f64; 2] {
        let mixing = sample_t_mixing(&mut self.rng, self.settings.prop_df_eta);
        let z0 = sample_standard_normal(&mut self.rng);
        let z1 = sample_standard_normal(&mut self.rng);
        let l = &fit.chol_cov;
        [
            (mixing * l[(0, 0)]).mul_add(z0, fit.mode[0]),
            mixing.mul_add(l[(1, 0)].mul_add(z0, l[(1, 1)] * z1), fit.mode[1]),
        ]
    }

    /// Independence Metropolis-Hastings decision for `proposal`, given the
    /// cluster-wide censoring log-likelihood at the proposal. The current
    /// log-likelihood is the one recorded at the start of the fit.
    pub fn accept_eta(
        &mut self,
        current: [f64; 2],
        proposal: [f64; 2],
        fit: &CensoringFit,
        log_likelihood_proposal: f64,
        stats: &mut ProposalStats,
    ) -> [f64; 2] {
        let prior = self.priors.eta;
        let target = |eta: [f64; 2], log_likelihood: f64| {
            log_likelihood + log_slope_prior(eta[1], prior.prior_scale, prior.prior_center)
        };
        let dof = self.settings.prop_df_eta;
        let log_acceptance = target(proposal, log_likelihood_proposal)
            - target(current, fit.log_likelihood_start)
            - log_t_proposal(fit, dof, proposal)
            + log_t_proposal(fit, dof, current);
        let accepted = log_likelihood_proposal.is_finite()
            && should_accept(log_acceptance, &mut self.rng);
        stats.record(accepted);
        if accepted { proposal } else { current }
    }

    /// Conjugate and Metropolis updates of everything but `eta`, followed by
    /// the next `r` proposal.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError::InvalidGlobal` if an update leaves a parameter
    /// outside its domain.
    pub fn update(
        &mut self,
        params: &GlobalParams,
        eta: [f64; 2],
        totals: &LocalSummary,
        r_proposal: f64,
        acceptance: &mut AcceptanceStats,
    ) -> Result<GlobalBroadcast, SamplerError> {
        let prior = self.priors.p_rnd_cen;
        let p_rnd_cen = sample_beta(
            &mut self.rng,
            prior.prior_a + totals.n_rnd_cen,
            prior.prior_b + totals.n_states - totals.n_rnd_cen,
        )
        .clamp(PROBABILITY_BOUNDS.0, PROBABILITY_BOUNDS.1);

        let sigmasq_dist = self.update_variance_dist(
            params.sigmasq_dist,
            &totals.sigmasq,
            self.priors.sigmasq_dist,
            &mut acceptance.sigmasq_dist,
        );
        let tausq_dist = self.update_variance_dist(
            params.tausq_dist,
            &totals.tausq,
            self.priors.tausq_dist,
            &mut acceptance.tausq_dist,
        );
        let n_states_dist = self.update_n_states_dist(
            params.n_states_dist,
            totals,
            r_proposal,
            &mut acceptance.n_states_dist,
        );

        let params = GlobalParams {
            eta,
            p_rnd_cen,
            sigmasq_dist,
            tausq_dist,
            n_states_dist,
        };
        check_globals(&params)?;
        let r_proposal = self.draw_r_proposal(params.n_states_dist.r);
        Ok(GlobalBroadcast { params, r_proposal })
    }

    /// Shape by log-random-walk MH, then rate from its Gamma conditional.
    fn update_variance_dist(
        &mut self,
        current: InverseGammaParams,
        stats: &VarianceStats,
        prior: VarianceDistPrior,
        proposals: &mut ProposalStats,
    ) -> InverseGammaParams {
        let target = |shape: f64| {
            stats.count.mul_add(
                shape * current.rate.ln() - ln_gamma(shape),
                -shape * stats.sum_log,
            ) + log_gamma_kernel(shape, prior.prior_shape.shape, prior.prior_shape.rate)
                + shape.ln()
        };
        let step = self.settings.prop_scale_shape * sample_standard_normal(&mut self.rng);
        let candidate = current.shape * step.exp();
        let accepted = should_accept(target(candidate) - target(current.shape), &mut self.rng);
        proposals.record(accepted);
        let shape = if accepted { candidate } else { current.shape };

        let rate = sample_gamma(
            &mut self.rng,
            stats.count.mul_add(shape, prior.prior_rate.shape),
            1.0 / (prior.prior_rate.rate + stats.sum_inverse),
        );
        InverseGammaParams { shape, rate }
    }

    /// `r` by log-random-walk MH against the pre-drawn proposal, then
    /// `1 - lmbda` from its Beta conditional.
    fn update_n_states_dist(
        &mut self,
        current: NegBinomialParams,
        totals: &LocalSummary,
        r_proposal: f64,
        proposals: &mut ProposalStats,
    ) -> NegBinomialParams {
        let counts = &totals.counts;
        let prior = self.priors.n_states_dist;
        let log_success = (1.0 - current.lmbda).ln();
        let target = |r: f64, sum_ln_gamma: f64| {
            sum_ln_gamma - counts.n_peptides * (ln_gamma(r) - r * log_success)
                + log_gamma_kernel(r, prior.prior_r.shape, prior.prior_r.rate)
                + r.ln()
        };
        let log_acceptance = target(r_proposal, counts.sum_ln_gamma_proposal)
            - target(current.r, counts.sum_ln_gamma_current);
        let accepted = r_proposal.is_finite()
            && r_proposal > 0.0
            && should_accept(log_acceptance, &mut self.rng);
        proposals.record(accepted);
        let r = if accepted { r_proposal } else { current.r };

        let success = sample_beta(
            &mut self.rng,
            counts.n_peptides.mul_add(r, prior.prior_p.a),
            prior.prior_p.b + counts.sum_excess,
        );
        NegBinomialParams {
            r,
            lmbda: (1.0 - success).clamp(PROBABILITY_BOUNDS.0, PROBABILITY_BOUNDS.1),
        }
    }

    /// Draw the calibration line from its normal conditional given the
    /// cluster-wide regression sums.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError` if the line is not identified or the drawn
    /// slope is zero.
    pub fn draw_line(&mut self, terms: &LineTerms) -> Result<[f64; 2], SamplerError> {
        let posterior = line_posterior(terms, &self.priors.beta_concentration)?;
        let z0 = sample_standard_normal(&mut self.rng);
        let z1 = sample_standard_normal(&mut self.rng);
        let l = &posterior.chol_cov;
        check_line([
            l[(0, 0)].mul_add(z0, posterior.mean[0]),
            l[(1, 0)].mul_add(z0, l[(1, 1)].mul_add(z1, posterior.mean[1])),
        ])
    }

    /// Mean and precision of the unknown concentrations: the mean from its
    /// normal conditional at the current precision, then the precision from
    /// its Gamma conditional at the new mean.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError::InvalidGlobal` if either draw is invalid.
    pub fn update_concentration_dist(
        &mut self,
        precision: f64,
        moments: &ConcentrationMoments,
    ) -> Result<(f64, f64), SamplerError> {
        let mean = sample_normal(
            &mut self.rng,
            moments.sum / moments.count,
            1.0 / (precision * moments.count),
        );
        if !mean.is_finite() {
            return Err(SamplerError::InvalidGlobal {
                parameter: "mean_concentration",
                value: mean,
            });
        }
        let prior = self.priors.prec_concentration;
        let precision = sample_gamma(
            &mut self.rng,
            0.5f64.mul_add(moments.count, prior.prior_shape),
            1.0 / 0.5f64.mul_add(moments.squared_deviation(mean), prior.prior_rate),
        );
        if !is_positive(precision) {
            return Err(SamplerError::InvalidGlobal {
                parameter: "prec_concentration",
                value: precision,
            });
        }
        Ok((mean, precision))
    }

    fn draw_r_proposal(&mut self, r: f64) -> f64 {
        r * (self.settings.prop_scale_r * sample_standard_normal(&mut self.rng)).exp()
    }
}

/// Log-density of the bivariate Student-t proposal, up to a constant.
fn log_t_proposal(fit: &CensoringFit, dof: f64, eta: [f64; 2]) -> f64 {
    let d = Mat::from_fn(2, 1, |row, _| eta[row] - fit.mode[row]);
    let info = &fit.information;
    let quad = d[(0, 0)] * (info[(0, 0)] * d[(0, 0)] + info[(0, 1)] * d[(1, 0)])
        + d[(1, 0)] * (info[(1, 0)] * d[(0, 0)] + info[(1, 1)] * d[(1, 0)]);
    -0.5 * (dof + 2.0) * (quad / dof).ln_1p()
}

/// Method-of-moments negative binomial for `n_states - 1`, clamped to a
/// usable range. Underdispersed or empty data fall back to matching the
/// mean with the largest allowed `r`.
#[must_use]
pub fn moment_estimate(moments: [f64; 3]) -> NegBinomialParams {
    let [count, sum, sum_sq] = moments;
    if !(count > 0.0) {
        return NegBinomialParams {
            r: 1.0,
            lmbda: 0.5,
        };
    }
    let mean = sum / count;
    let variance = mean.mul_add(-mean, sum_sq / count);
    let (r, lmbda) = if mean > 0.0 && variance > mean {
        (mean * mean / (variance - mean), 1.0 - mean / variance)
    } else {
        let r = R_BOUNDS.1;
        (r, mean / (mean + r))
    };
    NegBinomialParams {
        r: r.clamp(R_BOUNDS.0, R_BOUNDS.1),
        lmbda: lmbda.clamp(PROBABILITY_BOUNDS.0, PROBABILITY_BOUNDS.1),
    }
}

fn check_globals(params: &GlobalParams) -> Result<(), SamplerError> {
    let checks = [
        ("eta0", params.eta[0], params.eta[0].is_finite()),
        ("eta1", params.eta[1], params.eta[1].is_finite()),
        (
            "p_rnd_cen",
            params.p_rnd_cen,
            params.p_rnd_cen > 0.0 && params.p_rnd_cen < 1.0,
        ),
        ("shape_sigmasq", params.sigmasq_dist.shape, is_positive(params.sigmasq_dist.shape)),
        ("rate_sigmasq", params.sigmasq_dist.rate, is_positive(params.sigmasq_dist.rate)),
        ("shape_tausq", params.tausq_dist.shape, is_positive(params.tausq_dist.shape)),
        ("rate_tausq", params.tausq_dist.rate, is_positive(params.tausq_dist.rate)),
        ("r", params.n_states_dist.r, is_positive(params.n_states_dist.r)),
        (
            "lmbda",
            params.n_states_dist.lmbda,
            params.n_states_dist.lmbda > 0.0 && params.n_states_dist.lmbda < 1.0,
        ),
    ];
    match checks.into_iter().find(|&(_, _, valid)| !valid) {
        Some((parameter, value, _)) => Err(SamplerError::InvalidGlobal { parameter, value }),
        None => Ok(()),
    }
}

fn is_positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}
