/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Master-worker orchestration of the partitioned sampler.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Parallel orchestration
//!
//! A [`ParallelContext`] offers the two collectives the protocol needs:
//! all-reduce by summation and broadcast from rank 0. [`run_chain`] drives a
//! [`PartitionSampler`] through the per-iteration protocol:
//!
//! 1. local sweep, all-reduce of its sufficient statistics;
//! 2. censoring GLM fit from all-reduced terms (identical on every rank);
//! 3. `eta` proposal broadcast by the master, all-reduce of the local
//!    log-likelihood at the proposal, acceptance on the master;
//! 4. remaining global updates on the master, broadcast of the new globals.
//!
//! A supervised run adds a step after the sweep: all-reduce of the line's
//! regression sums, line draw on the master and broadcast, local
//! concentration draws, and, with a hierarchical concentration prior, an
//! all-reduce of the concentration moments followed by a broadcast of the
//! master's draw of their mean and precision.
//!
//! With a [`SoloContext`] every collective is the identity, which is how the
//! serial and the independent-globals modes run.

mod cluster;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{Config, Priors};
use crate::data::ExperimentData;
use crate::data::partition::{Partition, partition_all};
use crate::error::QuantError;
use crate::model::sampler::observed_count_moments;
use crate::model::supervision::{check_line, initial_concentration_dist, line_posterior};
use crate::model::{
    ConcentrationMoments, DrawSet, GlmTerms, GlobalBroadcast, GlobalUpdater, LineTerms,
    LocalSummary, PartitionSampler, PartitionTag, SamplerError, SupervisionParams,
    fit_censoring_glm,
};

pub use cluster::{ClusterEndpoint, ThreadCluster};

const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;
const GLOBAL_STREAM: u64 = 0xD1B5_4A32_D192_ED03;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParallelError {
    #[error("a peer rank disconnected")]
    Disconnected,
    #[error("a rank thread panicked")]
    WorkerPanicked,
    #[error("a cluster needs at least one rank")]
    EmptyCluster,
    #[error("reduction length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
}

/// Collective operations among the ranks of one run.
pub trait ParallelContext {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Element-wise sum over all ranks; every rank receives the same values.
    ///
    /// # Errors
    ///
    /// Returns `ParallelError` if a peer is gone or lengths disagree.
    fn all_reduce_sum(&self, values: &[f64]) -> Result<Vec<f64>, ParallelError>;

    /// Rank 0's `values` on every rank. Non-root input is ignored.
    ///
    /// # Errors
    ///
    /// Returns `ParallelError` if a peer is gone.
    fn broadcast(&self, values: Vec<f64>) -> Result<Vec<f64>, ParallelError>;

    fn is_master(&self) -> bool {
        self.rank() == 0
    }
}

/// Rank 0 of a single-rank run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloContext;

impl ParallelContext for SoloContext {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, values: &[f64]) -> Result<Vec<f64>, ParallelError> {
        Ok(values.to_vec())
    }

    fn broadcast(&self, values: Vec<f64>) -> Result<Vec<f64>, ParallelError> {
        Ok(values)
    }
}

fn stream_seed(seed: u64, rank: usize) -> u64 {
    let index = u64::try_from(rank).unwrap_or(u64::MAX);
    seed.wrapping_add(index.saturating_add(1).wrapping_mul(SEED_STRIDE))
}

fn pair_from_message(values: &[f64]) -> Result<[f64; 2], SamplerError> {
    values
        .try_into()
        .map_err(|_| SamplerError::MalformedMessage {
            expected: 2,
            found: values.len(),
        })
}

/// Starting line and concentration distribution of a supervised run. The
/// line is the posterior mean given the standards, so every rank computes
/// the same value without a broadcast.
fn start_supervision<C: ParallelContext>(
    ctx: &C,
    sampler: &mut PartitionSampler<'_>,
    priors: &Priors,
) -> Result<SupervisionParams, QuantError> {
    let terms = LineTerms::from_slice(&ctx.all_reduce_sum(&sampler.standard_terms().to_vec())?)?;
    let beta = check_line(line_posterior(&terms, &priors.beta_concentration)?.mean)?;
    let moments = sampler.initialize_concentrations(beta);
    let moments = ConcentrationMoments::from_slice(&ctx.all_reduce_sum(&moments.to_vec())?)?;
    let (mean_concentration, prec_concentration) = if priors.concentration_dist {
        initial_concentration_dist(&moments)?
    } else {
        (0.0, 0.0)
    };
    Ok(SupervisionParams {
        beta,
        mean_concentration,
        prec_concentration,
    })
}

/// One supervised step: draw the line, then the concentrations, then their
/// distribution if it is sampled.
fn supervise<C: ParallelContext>(
    ctx: &C,
    sampler: &mut PartitionSampler<'_>,
    mut updater: Option<&mut GlobalUpdater>,
    params: &mut SupervisionParams,
    concentration_dist: bool,
) -> Result<(), QuantError> {
    let local = sampler.line_terms(concentration_dist);
    let terms = LineTerms::from_slice(&ctx.all_reduce_sum(&local.to_vec())?)?;
    let beta = match updater.as_deref_mut() {
        Some(updater) => updater.draw_line(&terms)?.to_vec(),
        None => Vec::new(),
    };
    params.beta = pair_from_message(&ctx.broadcast(beta)?)?;

    let moments = sampler.update_concentrations(params)?;
    if !concentration_dist {
        return Ok(());
    }
    let moments = ConcentrationMoments::from_slice(&ctx.all_reduce_sum(&moments.to_vec())?)?;
    let dist = match updater {
        Some(updater) => {
            let (mean, precision) =
                updater.update_concentration_dist(params.prec_concentration, &moments)?;
            vec![mean, precision]
        }
        None => Vec::new(),
    };
    [params.mean_concentration, params.prec_concentration] =
        pair_from_message(&ctx.broadcast(dist)?)?;
    Ok(())
}

/// Run the full chain for one partition. Every rank of `ctx` must call this
/// with its own partition and the same configuration.
///
/// # Errors
///
/// Returns `QuantError` on sampler failures or lost peers.
pub fn run_chain<C: ParallelContext>(
    ctx: &C,
    partition: &Partition,
    config: &Config,
) -> Result<DrawSet, QuantError> {
    let settings = &config.settings;
    let priors = &config.priors;
    let link = priors.glm_link;
    let rank = partition.rank;
    let n_iterations = settings.n_iterations;

    let mut updater = ctx.is_master().then(|| {
        GlobalUpdater::new(
            priors,
            settings,
            StdRng::seed_from_u64(stream_seed(settings.seed ^ GLOBAL_STREAM, rank)),
        )
    });

    let moments = ctx.all_reduce_sum(&observed_count_moments(partition))?;
    let moments: [f64; 3] = moments
        .as_slice()
        .try_into()
        .map_err(|_| SamplerError::MalformedMessage {
            expected: 3,
            found: moments.len(),
        })?;
    let initial = match updater.as_mut() {
        Some(updater) => updater.initial_broadcast(&config.init, moments)?.to_vec(),
        None => Vec::new(),
    };
    let mut broadcast = GlobalBroadcast::from_slice(&ctx.broadcast(initial)?)?;

    let mut sampler = PartitionSampler::new(
        partition,
        priors,
        settings.prop_df_y_mis,
        &broadcast.params,
        StdRng::seed_from_u64(stream_seed(settings.seed, rank)),
    )?;
    let mut draws = DrawSet::allocate(
        PartitionTag::from_partition(partition),
        n_iterations,
        settings.synchronize_globals,
    );
    let mut supervision = if priors.supervised {
        let params = start_supervision(ctx, &mut sampler, priors)?;
        draws.enable_supervision(priors.concentration_dist);
        draws.record_supervision(0, &sampler.state().concentration, &params);
        Some(params)
    } else {
        None
    };
    draws.record(0, sampler.state(), &broadcast.params);

    debug!(
        "rank {rank}: {} proteins, {} peptides, {} observed states",
        partition.n_proteins(),
        partition.n_peptides(),
        partition.n_states_obs()
    );

    for iteration in 1..n_iterations {
        let summary = sampler.sweep(&broadcast.params, broadcast.r_proposal)?;
        if let Some(params) = supervision.as_mut() {
            supervise(ctx, &mut sampler, updater.as_mut(), params, priors.concentration_dist)?;
        }
        let totals = LocalSummary::from_slice(&ctx.all_reduce_sum(&summary.to_vec())?)?;

        let current_eta = broadcast.params.eta;
        let fit = fit_censoring_glm(current_eta, |eta| -> Result<GlmTerms, QuantError> {
            let local = sampler.censoring_terms(link, eta);
            Ok(GlmTerms::from_slice(&ctx.all_reduce_sum(&local.to_vec())?)?)
        })?;

        let mut eta = current_eta;
        if let Some(fit) = fit {
            let proposal = match updater.as_mut() {
                Some(updater) => updater.propose_eta(&fit).to_vec(),
                None => Vec::new(),
            };
            let proposal = pair_from_message(&ctx.broadcast(proposal)?)?;
            let local = sampler.censoring_log_likelihood(link, proposal);
            let log_likelihood = ctx.all_reduce_sum(&[local])?;
            if let Some(updater) = updater.as_mut() {
                eta = updater.accept_eta(
                    current_eta,
                    proposal,
                    &fit,
                    log_likelihood.first().copied().unwrap_or(f64::NAN),
                    &mut draws.acceptance.eta,
                );
            }
        }

        let next = match updater.as_mut() {
            Some(updater) => updater
                .update(
                    &broadcast.params,
                    eta,
                    &totals,
                    broadcast.r_proposal,
                    &mut draws.acceptance,
                )?
                .to_vec(),
            None => Vec::new(),
        };
        broadcast = GlobalBroadcast::from_slice(&ctx.broadcast(next)?)?;
        draws.record(iteration, sampler.state(), &broadcast.params);
        if let Some(params) = &supervision {
            draws.record_supervision(iteration, &sampler.state().concentration, params);
        }

        if settings.verbose > 0 && ctx.is_master() && iteration % settings.verbose_interval == 0 {
            info!("rank {rank}: iteration {iteration} of {n_iterations}");
            if settings.verbose > 1 {
                for (block, rate) in draws.acceptance.rates() {
                    debug!("rank {rank}: {block} acceptance {rate:.3}");
                }
            }
        }
    }

    Ok(draws)
}

/// Partition `data` over `n_workers` ranks and run them in this process.
///
/// Synchronized runs use a [`ThreadCluster`] with one OS thread per rank;
/// independent runs give every rank its own [`SoloContext`] and spread the
/// ranks over the rayon pool. The draw sets come back in rank order.
///
/// # Errors
///
/// Returns the first rank failure. Disconnections caused by another rank's
/// failure are only reported if nothing more specific is available.
pub fn run_parallel(
    data: &ExperimentData,
    config: &Config,
    n_workers: usize,
) -> Result<Vec<DrawSet>, QuantError> {
    let settings = &config.settings;
    let partitions = partition_all(data, n_workers, settings.n_strata, settings.seed_load_data)?;
    info!(
        "running {n_workers} ranks ({} globals)",
        if settings.synchronize_globals {
            "synchronized"
        } else {
            "independent"
        }
    );

    if !settings.synchronize_globals {
        return partitions
            .par_iter()
            .map(|partition| run_chain(&SoloContext, partition, config))
            .collect();
    }

    let endpoints = ThreadCluster::new(n_workers)?;
    let results: Vec<Result<DrawSet, QuantError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .zip(&partitions)
            .map(|(endpoint, partition)| {
                scope.spawn(move || run_chain(&endpoint, partition, config))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(ParallelError::WorkerPanicked.into()))
            })
            .collect()
    });
    collect_ranks(results)
}

fn collect_ranks(results: Vec<Result<DrawSet, QuantError>>) -> Result<Vec<DrawSet>, QuantError> {
    let mut draws = Vec::with_capacity(results.len());
    let mut disconnected = None;
    for result in results {
        match result {
            Ok(set) => draws.push(set),
            Err(QuantError::Parallel(ParallelError::Disconnected)) => {
                disconnected = Some(ParallelError::Disconnected);
            }
            Err(error) => return Err(error),
        }
    }
    match disconnected {
        Some(error) => Err(error.into()),
        None => Ok(draws),
    }
}
