//! Partition-local Gibbs sweep.
//!
//! One sweep imputes the censored states of every peptide, then draws the
//! peptide effects, the protein variances and the protein means from their
//! conjugate conditionals. The sweep returns the sufficient statistics the
//! global updates need; it never talks to other ranks.
//!
//! In a supervised run the protein means are not drawn by the sweep. They
//! follow the concentrations, which [`PartitionSampler::update_concentrations`]
//! draws once the calibration line of the iteration is known.

use rand::rngs::StdRng;
use statrs::function::gamma::ln_gamma;

use crate::config::Priors;
use crate::data::partition::Partition;
use crate::utils::usize_to_f64;

use super::SamplerError;
use super::censoring::{
    CensoredIntensity, censoring_probability, sample_censored_state, sample_n_censored,
};
use super::distributions::{sample_inverse_gamma, sample_normal};
use super::likelihood::GlmLink;
use super::state::{CountStats, GlmTerms, GlobalParams, LocalSummary, VarianceStats};
use super::supervision::{ConcentrationMoments, LineTerms, SupervisionParams};

/// Imputed censored states of the current iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CensoredStates {
    pub intensities: Vec<f64>,
    /// Local peptide of each censored state.
    pub peptides: Vec<usize>,
    /// Whether each state was censored at random (`W = 1`).
    pub random: Vec<bool>,
}

impl CensoredStates {
    fn clear(&mut self) {
        self.intensities.clear();
        self.peptides.clear();
        self.random.clear();
    }

    fn push(&mut self, peptide: usize, intensity: f64, random: bool) {
        self.intensities.push(intensity);
        self.peptides.push(peptide);
        self.random.push(random);
    }
}

/// Current values of every partition-local parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalState {
    pub mu: Vec<f64>,
    pub sigmasq: Vec<f64>,
    pub tausq: Vec<f64>,
    pub gamma: Vec<f64>,
    pub n_cen_states_per_peptide: Vec<u32>,
    pub censored: CensoredStates,
    /// Protein concentrations; empty unless the run is supervised.
    pub concentration: Vec<f64>,
}

/// Method-of-moments inputs for `n_states - 1` over observed peptides:
/// `[count, sum, sum of squares]`. Summable across ranks.
#[must_use]
pub fn observed_count_moments(partition: &Partition) -> [f64; 3] {
    partition
        .n_obs_states_per_peptide()
        .into_iter()
        .filter(|&n_obs| n_obs > 0)
        .fold([0.0; 3], |acc, n_obs| {
            let excess = usize_to_f64(n_obs - 1);
            [acc[0] + 1.0, acc[1] + excess, excess.mul_add(excess, acc[2])]
        })
}

pub struct PartitionSampler<'a> {
    partition: &'a Partition,
    priors: &'a Priors,
    prop_df_y_mis: f64,
    n_obs_per_peptide: Vec<usize>,
    n_peptides_per_protein: Vec<usize>,
    obs_sum_per_peptide: Vec<f64>,
    /// Known concentration of each local protein; empty unless supervised.
    known: Vec<Option<f64>>,
    state: LocalState,
    rng: StdRng,
}

impl<'a> PartitionSampler<'a> {
    /// Initialize the local state from the observed data and the initial
    /// global parameters.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError::NonPositiveVariance` if the initial variance
    /// draws are invalid.
    pub fn new(
        partition: &'a Partition,
        priors: &'a Priors,
        prop_df_y_mis: f64,
        globals: &GlobalParams,
        mut rng: StdRng,
    ) -> Result<Self, SamplerError> {
        let n_proteins = partition.n_proteins();
        let n_obs_per_peptide = partition.n_obs_states_per_peptide();
        let n_peptides_per_protein = partition.n_peptides_per_protein();
        let mut obs_sum_per_peptide = vec![0.0; partition.n_peptides()];
        for (&peptide, &intensity) in partition
            .mapping_states_obs
            .iter()
            .zip(&partition.intensities_obs)
        {
            obs_sum_per_peptide[peptide] += intensity;
        }

        let peptide_means: Vec<Option<f64>> = obs_sum_per_peptide
            .iter()
            .zip(&n_obs_per_peptide)
            .map(|(&sum, &n_obs)| (n_obs > 0).then(|| sum / usize_to_f64(n_obs)))
            .collect();

        let mut protein_sums = vec![0.0; n_proteins];
        let mut protein_counts = vec![0_usize; n_proteins];
        for (peptide, mean) in peptide_means.iter().enumerate() {
            if let Some(mean) = mean {
                let protein = partition.mapping_peptides[peptide];
                protein_sums[protein] += mean;
                protein_counts[protein] += 1;
            }
        }
        let fallback = peptide_means
            .iter()
            .flatten()
            .copied()
            .reduce(f64::min)
            .unwrap_or(priors.mu.prior_mean);
        let mu: Vec<f64> = protein_sums
            .iter()
            .zip(&protein_counts)
            .map(|(&sum, &count)| {
                if count > 0 {
                    sum / usize_to_f64(count)
                } else {
                    fallback
                }
            })
            .collect();
        let gamma = peptide_means
            .iter()
            .enumerate()
            .map(|(peptide, mean)| mean.unwrap_or(mu[partition.mapping_peptides[peptide]]))
            .collect();

        let sigmasq: Vec<f64> = (0..n_proteins)
            .map(|_| {
                sample_inverse_gamma(&mut rng, globals.sigmasq_dist.shape, globals.sigmasq_dist.rate)
            })
            .collect();
        let tausq: Vec<f64> = (0..n_proteins)
            .map(|_| sample_inverse_gamma(&mut rng, globals.tausq_dist.shape, globals.tausq_dist.rate))
            .collect();
        check_variances("sigmasq", &sigmasq, &partition.protein_indices)?;
        check_variances("tausq", &tausq, &partition.protein_indices)?;

        let known = if priors.supervised {
            let mut known = vec![None; n_proteins];
            for &(protein, concentration) in &partition.known_concentrations {
                known[protein] = Some(concentration);
            }
            known
        } else {
            Vec::new()
        };

        Ok(Self {
            partition,
            priors,
            prop_df_y_mis,
            n_obs_per_peptide,
            n_peptides_per_protein,
            obs_sum_per_peptide,
            state: LocalState {
                mu,
                sigmasq,
                tausq,
                gamma,
                n_cen_states_per_peptide: vec![0; partition.n_peptides()],
                censored: CensoredStates::default(),
                concentration: Vec::new(),
            },
            known,
            rng,
        })
    }

    #[must_use]
    pub const fn state(&self) -> &LocalState {
        &self.state
    }

    #[must_use]
    pub const fn partition(&self) -> &Partition {
        self.partition
    }

    const fn is_supervised(&self) -> bool {
        self.priors.supervised
    }

    /// One local sweep given the current global parameters. `r_proposal` is
    /// the pre-drawn proposal for the number-of-states dispersion, at which
    /// the local count log-likelihood is also evaluated. Supervised runs
    /// leave the protein means to [`Self::update_concentrations`].
    ///
    /// # Errors
    ///
    /// Returns `SamplerError::NonPositiveVariance` if a variance draw is
    /// invalid.
    pub fn sweep(
        &mut self,
        globals: &GlobalParams,
        r_proposal: f64,
    ) -> Result<LocalSummary, SamplerError> {
        let n_proteins = self.partition.n_proteins();
        let mapping = &self.partition.mapping_peptides;

        self.impute_censored(globals);

        let mut n_states_per_peptide = self.n_obs_per_peptide.clone();
        let mut sum_per_peptide = self.obs_sum_per_peptide.clone();
        for (&peptide, &intensity) in self
            .state
            .censored
            .peptides
            .iter()
            .zip(&self.state.censored.intensities)
        {
            n_states_per_peptide[peptide] += 1;
            sum_per_peptide[peptide] += intensity;
        }

        for (peptide, gamma) in self.state.gamma.iter_mut().enumerate() {
            let protein = mapping[peptide];
            let sigmasq = self.state.sigmasq[protein];
            let tausq = self.state.tausq[protein];
            let precision = 1.0 / tausq + usize_to_f64(n_states_per_peptide[peptide]) / sigmasq;
            let mean = (self.state.mu[protein] / tausq + sum_per_peptide[peptide] / sigmasq)
                / precision;
            *gamma = sample_normal(&mut self.rng, mean, 1.0 / precision);
        }

        let mut state_rss = vec![0.0; n_proteins];
        let mut n_states_per_protein = vec![0_usize; n_proteins];
        let observed = self
            .partition
            .mapping_states_obs
            .iter()
            .zip(&self.partition.intensities_obs);
        let censored = self
            .state
            .censored
            .peptides
            .iter()
            .zip(&self.state.censored.intensities);
        for (&peptide, &intensity) in observed.chain(censored) {
            let protein = mapping[peptide];
            let residual = intensity - self.state.gamma[peptide];
            state_rss[protein] += residual * residual;
            n_states_per_protein[protein] += 1;
        }
        let mut sigmasq_stats = VarianceStats::default();
        for protein in 0..n_proteins {
            let shape = 0.5f64.mul_add(
                usize_to_f64(n_states_per_protein[protein]),
                globals.sigmasq_dist.shape,
            );
            let rate = 0.5f64.mul_add(state_rss[protein], globals.sigmasq_dist.rate);
            let value = sample_inverse_gamma(&mut self.rng, shape, rate);
            check_variance("sigmasq", value, self.partition.protein_indices[protein])?;
            self.state.sigmasq[protein] = value;
            sigmasq_stats.push(value);
        }

        let mut peptide_rss = vec![0.0; n_proteins];
        for (peptide, &gamma) in self.state.gamma.iter().enumerate() {
            let protein = mapping[peptide];
            let residual = gamma - self.state.mu[protein];
            peptide_rss[protein] += residual * residual;
        }
        let mut tausq_stats = VarianceStats::default();
        for protein in 0..n_proteins {
            let n_peptides = usize_to_f64(self.n_peptides_per_protein[protein]);
            let shape = 0.5f64.mul_add(n_peptides, globals.tausq_dist.shape);
            let rate = 0.5f64.mul_add(peptide_rss[protein], globals.tausq_dist.rate);
            let value = sample_inverse_gamma(&mut self.rng, shape, rate);
            check_variance("tausq", value, self.partition.protein_indices[protein])?;
            self.state.tausq[protein] = value;
            tausq_stats.push(value);
        }

        if !self.is_supervised() {
            self.draw_mu();
        }

        let r = globals.n_states_dist.r;
        let mut counts = CountStats::default();
        for &n_states in &n_states_per_peptide {
            let excess = usize_to_f64(n_states.saturating_sub(1));
            counts.n_peptides += 1.0;
            counts.sum_excess += excess;
            counts.sum_ln_gamma_current += ln_gamma(excess + r);
            counts.sum_ln_gamma_proposal += ln_gamma(excess + r_proposal);
        }

        let n_states: usize = n_states_per_peptide.iter().sum();
        let n_rnd_cen = self.state.censored.random.iter().filter(|&&w| w).count();
        Ok(LocalSummary {
            n_states: usize_to_f64(n_states),
            n_rnd_cen: usize_to_f64(n_rnd_cen),
            sigmasq: sigmasq_stats,
            tausq: tausq_stats,
            counts,
        })
    }

    fn gamma_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.partition.n_proteins()];
        for (&protein, &gamma) in self.partition.mapping_peptides.iter().zip(&self.state.gamma) {
            sums[protein] += gamma;
        }
        sums
    }

    fn draw_mu(&mut self) {
        let prior = self.priors.mu;
        let gamma_sums = self.gamma_sums();
        for (protein, gamma_sum) in gamma_sums.into_iter().enumerate() {
            let tausq = self.state.tausq[protein];
            let n_peptides = usize_to_f64(self.n_peptides_per_protein[protein]);
            let precision = prior.prior_prec + n_peptides / tausq;
            let mean = prior.prior_mean.mul_add(prior.prior_prec, gamma_sum / tausq) / precision;
            self.state.mu[protein] = sample_normal(&mut self.rng, mean, 1.0 / precision);
        }
    }

    /// Regression sums of the current protein means on the known
    /// concentrations of the local standards, with unit weights.
    #[must_use]
    pub fn standard_terms(&self) -> LineTerms {
        let mut terms = LineTerms::default();
        for &(protein, concentration) in &self.partition.known_concentrations {
            terms.push(1.0, concentration, self.state.mu[protein]);
        }
        terms
    }

    /// Put the standards on `beta` and invert it for every other protein,
    /// returning the moments of the starting concentrations.
    pub fn initialize_concentrations(&mut self, beta: [f64; 2]) -> ConcentrationMoments {
        let mut moments = ConcentrationMoments::default();
        self.state.concentration = self
            .state
            .mu
            .iter_mut()
            .zip(&self.known)
            .map(|(mu, known)| {
                let concentration = match *known {
                    Some(concentration) => {
                        *mu = beta[1].mul_add(concentration, beta[0]);
                        concentration
                    }
                    None => (*mu - beta[0]) / beta[1],
                };
                moments.push(concentration);
                concentration
            })
            .collect();
        moments
    }

    /// Weighted regression sums of the mean peptide effect of each protein
    /// on its concentration, with weight `n_peptides / tausq`. Only the
    /// standards contribute unless `all_proteins` is set.
    #[must_use]
    pub fn line_terms(&self, all_proteins: bool) -> LineTerms {
        let mut terms = LineTerms::default();
        let gamma_sums = self.gamma_sums();
        for (protein, known) in self.known.iter().enumerate() {
            if !all_proteins && known.is_none() {
                continue;
            }
            let n_peptides = usize_to_f64(self.n_peptides_per_protein[protein]);
            terms.push(
                n_peptides / self.state.tausq[protein],
                self.state.concentration[protein],
                gamma_sums[protein] / n_peptides,
            );
        }
        terms
    }

    /// Draw the concentration of every protein that is not a standard and
    /// set the protein means on the line, returning the moments of the new
    /// concentrations.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError::InvalidGlobal` if a concentration conditional
    /// is improper, which happens with a flat concentration prior and a
    /// zero slope.
    pub fn update_concentrations(
        &mut self,
        params: &SupervisionParams,
    ) -> Result<ConcentrationMoments, SamplerError> {
        let [beta0, beta1] = params.beta;
        let gamma_sums = self.gamma_sums();
        let mut moments = ConcentrationMoments::default();
        for (protein, known) in self.known.iter().enumerate() {
            let concentration = match *known {
                Some(concentration) => concentration,
                None => {
                    let n_over_tausq =
                        usize_to_f64(self.n_peptides_per_protein[protein]) / self.state.tausq[protein];
                    let precision = (beta1 * beta1).mul_add(n_over_tausq, params.prec_concentration);
                    if !(precision > 0.0 && precision.is_finite()) {
                        return Err(SamplerError::InvalidGlobal {
                            parameter: "concentration precision",
                            value: precision,
                        });
                    }
                    let residual_sum = beta0.mul_add(
                        -usize_to_f64(self.n_peptides_per_protein[protein]),
                        gamma_sums[protein],
                    );
                    let mean = params.prec_concentration.mul_add(
                        params.mean_concentration,
                        beta1 * residual_sum / self.state.tausq[protein],
                    ) / precision;
                    sample_normal(&mut self.rng, mean, 1.0 / precision)
                }
            };
            self.state.concentration[protein] = concentration;
            self.state.mu[protein] = beta1.mul_add(concentration, beta0);
            moments.push(concentration);
        }
        Ok(moments)
    }

    fn impute_censored(&mut self, globals: &GlobalParams) {
        let link = self.priors.glm_link;
        let mapping = &self.partition.mapping_peptides;
        self.state.censored.clear();
        for peptide in 0..self.partition.n_peptides() {
            let protein = mapping[peptide];
            let density = CensoredIntensity::characterize(
                link,
                globals.eta,
                self.state.gamma[peptide],
                self.state.sigmasq[protein],
            );
            let p_cen = censoring_probability(globals.p_rnd_cen, density.p_int_cen());
            let n_cen = sample_n_censored(
                &mut self.rng,
                self.n_obs_per_peptide[peptide],
                p_cen,
                globals.n_states_dist,
            );
            self.state.n_cen_states_per_peptide[peptide] = n_cen;
            for _ in 0..n_cen {
                let (intensity, random) = sample_censored_state(
                    &mut self.rng,
                    &density,
                    globals.p_rnd_cen,
                    self.prop_df_y_mis,
                );
                self.state.censored.push(peptide, intensity, random);
            }
        }
    }

    /// Log-likelihood, gradient and Hessian of the censoring GLM over the
    /// local at-risk states: observed states (response 1) and
    /// intensity-censored states (response 0).
    #[must_use]
    pub fn censoring_terms(&self, link: GlmLink, eta: [f64; 2]) -> GlmTerms {
        let mut terms = GlmTerms::default();
        for &y in &self.partition.intensities_obs {
            let z = eta[1].mul_add(y, eta[0]);
            let (first, second) = link.log_observed_derivatives(z);
            terms.accumulate(link.log_observed(z), first, second, y);
        }
        for (&y, &random) in self
            .state
            .censored
            .intensities
            .iter()
            .zip(&self.state.censored.random)
        {
            if random {
                continue;
            }
            let z = eta[1].mul_add(y, eta[0]);
            let (first, second) = link.log_censored_derivatives(z);
            terms.accumulate(link.log_censored(z), first, second, y);
        }
        terms
    }

    /// Local censoring log-likelihood at `eta`.
    #[must_use]
    pub fn censoring_log_likelihood(&self, link: GlmLink, eta: [f64; 2]) -> f64 {
        let observed: f64 = self
            .partition
            .intensities_obs
            .iter()
            .map(|&y| link.log_observed(eta[1].mul_add(y, eta[0])))
            .sum();
        let censored: f64 = self
            .state
            .censored
            .intensities
            .iter()
            .zip(&self.state.censored.random)
            .filter(|&(_, &random)| !random)
            .map(|(&y, _)| link.log_censored(eta[1].mul_add(y, eta[0])))
            .sum();
        observed + censored
    }
}

fn check_variance(parameter: &'static str, value: f64, protein: usize) -> Result<(), SamplerError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SamplerError::NonPositiveVariance {
            parameter,
            protein,
            value,
        })
    }
}

fn check_variances(
    parameter: &'static str,
    values: &[f64],
    proteins: &[usize],
) -> Result<(), SamplerError> {
    values
        .iter()
        .zip(proteins)
        .try_for_each(|(&value, &protein)| check_variance(parameter, value, protein))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::config::tests::example_config;
    use crate::config::InverseGammaParams;
    use crate::data::partition::partition_for_rank;
    use crate::data::{ExperimentData, KnownConcentrations};
    use crate::model::state::NegBinomialParams;

    fn globals() -> GlobalParams {
        GlobalParams {
            eta: [-6.0, 0.5],
            p_rnd_cen: 0.05,
            sigmasq_dist: InverseGammaParams {
                shape: 5.0,
                rate: 1.0,
            },
            tausq_dist: InverseGammaParams {
                shape: 5.0,
                rate: 1.0,
            },
            n_states_dist: NegBinomialParams { r: 3.0, lmbda: 0.5 },
        }
    }

    fn partition() -> Partition {
        // Two proteins; peptide 2 has no observed states.
        let data = ExperimentData::new(
            vec![14.0, 14.5, 13.8, 20.1, 19.7, 20.4, 19.9],
            vec![0, 0, 1, 3, 3, 4, 4],
            vec![0, 0, 0, 1, 1],
        )
        .expect("valid data");
        partition_for_rank(&data, 1, 0, 2, 0).expect("single partition")
    }

    #[test]
    fn initial_values_follow_observed_means() {
        let config = example_config();
        let partition = partition();
        let sampler = PartitionSampler::new(
            &partition,
            &config.priors,
            5.0,
            &globals(),
            StdRng::seed_from_u64(1),
        )
        .expect("initializes");
        let state = sampler.state();
        let protein0 = (14.25 + 13.8) / 2.0;
        assert!((state.mu[0] - protein0).abs() < 1.0e-12);
        assert!((state.gamma[2] - protein0).abs() < 1.0e-12);
        assert!((state.gamma[3] - 19.9).abs() < 1.0e-12);
        assert!(state.sigmasq.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn sweep_keeps_state_valid_and_imputes_unobserved_peptides() {
        let config = example_config();
        let partition = partition();
        let globals = globals();
        let mut sampler = PartitionSampler::new(
            &partition,
            &config.priors,
            5.0,
            &globals,
            StdRng::seed_from_u64(2),
        )
        .expect("initializes");
        for _ in 0..50 {
            let summary = sampler.sweep(&globals, 3.2).expect("sweep succeeds");
            assert!(sampler.state().n_cen_states_per_peptide[2] >= 1);
            assert!((summary.counts.n_peptides - 5.0).abs() < 1.0e-12);
            assert!((summary.sigmasq.count - 2.0).abs() < 1.0e-12);
            assert!(summary.n_states >= 8.0);
            assert!(summary.n_rnd_cen <= summary.n_states);
        }
        let state = sampler.state();
        assert!(state.tausq.iter().all(|&v| v > 0.0 && v.is_finite()));
        assert!(state.mu[1] > state.mu[0]);
    }

    #[test]
    fn censoring_terms_match_log_likelihood() {
        let config = example_config();
        let partition = partition();
        let globals = globals();
        let mut sampler = PartitionSampler::new(
            &partition,
            &config.priors,
            5.0,
            &globals,
            StdRng::seed_from_u64(3),
        )
        .expect("initializes");
        sampler.sweep(&globals, 3.0).expect("sweep succeeds");
        let eta = [-4.0, 0.3];
        let terms = sampler.censoring_terms(GlmLink::Logit, eta);
        let direct = sampler.censoring_log_likelihood(GlmLink::Logit, eta);
        assert!((terms.log_likelihood - direct).abs() < 1.0e-9);
        let h = 1.0e-6;
        let shifted = sampler.censoring_log_likelihood(GlmLink::Logit, [eta[0] + h, eta[1]]);
        assert!(((shifted - direct) / h - terms.gradient[0]).abs() < 1.0e-3);
    }

    #[test]
    fn empty_partition_sweeps_trivially() {
        let config = example_config();
        let data = ExperimentData::new(vec![1.0], vec![0], vec![0]).expect("valid");
        let partition = partition_for_rank(&data, 2, 1, 1, 0).expect("empty rank");
        let globals = globals();
        let mut sampler = PartitionSampler::new(
            &partition,
            &config.priors,
            5.0,
            &globals,
            StdRng::seed_from_u64(4),
        )
        .expect("initializes");
        let summary = sampler.sweep(&globals, 3.0).expect("sweep succeeds");
        assert_eq!(summary, LocalSummary::default());
        assert!(sampler.state().mu.is_empty());
    }

    #[test]
    fn supervised_means_follow_the_line_and_standards_stay_fixed() {
        let mut config = example_config();
        config.priors.supervised = true;
        let data = ExperimentData::new(
            vec![14.0, 14.5, 13.8, 20.1, 19.7, 20.4, 19.9],
            vec![0, 0, 1, 3, 3, 4, 4],
            vec![0, 0, 0, 1, 1],
        )
        .and_then(|data| {
            data.with_known_concentrations(KnownConcentrations {
                proteins: vec![1],
                concentrations: vec![4.0],
            })
        })
        .expect("valid data");
        let partition = partition_for_rank(&data, 1, 0, 2, 0).expect("single partition");
        let globals = globals();
        let mut sampler = PartitionSampler::new(
            &partition,
            &config.priors,
            5.0,
            &globals,
            StdRng::seed_from_u64(5),
        )
        .expect("initializes");
        let start = sampler.state().mu[0];
        let moments = sampler.initialize_concentrations([10.0, 2.5]);
        assert!((moments.count - 2.0).abs() < 1.0e-12);
        assert!((sampler.state().mu[1] - 20.0).abs() < 1.0e-12);
        assert!((sampler.state().concentration[0] - (start - 10.0) / 2.5).abs() < 1.0e-12);

        let params = SupervisionParams {
            beta: [10.0, 2.5],
            mean_concentration: 0.0,
            prec_concentration: 0.0,
        };
        for _ in 0..20 {
            let before = sampler.state().mu.clone();
            sampler.sweep(&globals, 3.0).expect("sweep succeeds");
            assert_eq!(sampler.state().mu, before);
            let terms = sampler.line_terms(false);
            assert!(terms.weight > 0.0);
            assert!((terms.weight_x / terms.weight - 4.0).abs() < 1.0e-12);
            sampler.update_concentrations(&params).expect("proper conditional");
            let state = sampler.state();
            assert!((state.concentration[1] - 4.0).abs() < 1.0e-12);
            for (mu, concentration) in state.mu.iter().zip(&state.concentration) {
                assert!((mu - 2.5f64.mul_add(*concentration, 10.0)).abs() < 1.0e-9);
            }
        }
    }

    #[test]
    fn flat_concentration_prior_needs_a_slope() {
        let mut config = example_config();
        config.priors.supervised = true;
        let partition = partition();
        let globals = globals();
        let mut sampler = PartitionSampler::new(
            &partition,
            &config.priors,
            5.0,
            &globals,
            StdRng::seed_from_u64(6),
        )
        .expect("initializes");
        sampler.initialize_concentrations([0.0, 1.0]);
        let flat = SupervisionParams {
            beta: [0.0, 0.0],
            ..SupervisionParams::default()
        };
        assert!(matches!(
            sampler.update_concentrations(&flat),
            Err(SamplerError::InvalidGlobal { .. })
        ));
    }

    #[test]
    fn unsupervised_sampler_has_no_line_terms() {
        let config = example_config();
        let partition = partition();
        let sampler = PartitionSampler::new(
            &partition,
            &config.priors,
            5.0,
            &globals(),
            StdRng::seed_from_u64(7),
        )
        .expect("initializes");
        assert_eq!(sampler.line_terms(true), LineTerms::default());
        assert!(sampler.state().concentration.is_empty());
    }

    #[test]
    fn count_moments_skip_unobserved_peptides() {
        let moments = observed_count_moments(&partition());
        assert_eq!(moments, [4.0, 3.0, 3.0]);
    }
}
