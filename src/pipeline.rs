//! Pipeline stages behind the command-line drivers.
//!
//! Every stage reads its inputs from the paths in a [`Config`], does one
//! step of the workflow and writes its output atomically. Stages can be run
//! one after another in a single process or from separate invocations.

use log::info;

use crate::calibration::apply_calibration;
use crate::combine::combine_draws;
use crate::config::{Config, ConfigError, check_rank};
use crate::data::partition::partition_for_rank;
use crate::data::{ExperimentData, KnownConcentrations, load_names};
use crate::error::QuantError;
use crate::model::DrawSet;
use crate::parallel::{SoloContext, run_chain, run_parallel};
use crate::storage::{read_draw_set, write_draw_set};
use crate::summary::{SummaryReport, summarize_draws, write_summary};

/// Load the experiment and, for a supervised run, attach its standards.
fn load_experiment(config: &Config) -> Result<ExperimentData, QuantError> {
    let data = load_experiment(config)?;
    if !config.priors.supervised {
        return Ok(data);
    }
    let known = load_standards(config)?;
    info!("supervising the run with {} standards", known.proteins.len());
    Ok(data.with_known_concentrations(known)?)
}

fn load_standards(config: &Config) -> Result<KnownConcentrations, QuantError> {
    let path = config
        .data
        .path_concentrations
        .as_deref()
        .ok_or(ConfigError::MissingConcentrations)?;
    Ok(KnownConcentrations::load(path, config.data.delimiter()?)?)
}

/// Run the whole model as a single rank and write the combined draw set.
///
/// # Errors
///
/// Returns `QuantError` if the data cannot be loaded, sampling fails or the
/// output cannot be written.
pub fn run_serial_stage(config: &Config) -> Result<DrawSet, QuantError> {
    let data = load_experiment(config)?;
    let settings = &config.settings;
    let partition = partition_for_rank(&data, 1, 0, settings.n_strata, settings.seed_load_data)?;
    let draws = run_chain(&SoloContext, &partition, config)?;
    write_draw_set(&config.output.path_combined, &draws, config.output.compress.codec())?;
    info!("wrote {}", config.output.path_combined.display());
    Ok(draws)
}

/// Run `n_workers` ranks in this process and write one draw set per rank.
///
/// # Errors
///
/// Returns `QuantError` for an invalid worker count, a failing rank or an
/// unwritable output.
pub fn run_parallel_stage(config: &Config, n_workers: usize) -> Result<Vec<DrawSet>, QuantError> {
    check_rank(0, n_workers)?;
    let codec = config.output.compress_pickle.codec();
    let data = load_experiment(config)?;
    let draws = run_parallel(&data, config, n_workers)?;
    for set in &draws {
        let path = config.output.rank_path(set.tag.rank);
        write_draw_set(&path, set, codec)?;
        info!("rank {}: wrote {}", set.tag.rank, path.display());
    }
    Ok(draws)
}

/// Run a single detached rank. Detached ranks cannot communicate, so this
/// requires independent global parameters.
///
/// # Errors
///
/// Returns `ConfigError::SynchronizedWorker` in synchronized mode, and
/// `QuantError` for an invalid rank or any failure of the run.
pub fn run_worker_stage(config: &Config, rank: usize, n_workers: usize) -> Result<DrawSet, QuantError> {
    if config.settings.synchronize_globals {
        return Err(ConfigError::SynchronizedWorker.into());
    }
    check_rank(rank, n_workers)?;
    let codec = config.output.compress_pickle.codec();
    let data = load_experiment(config)?;
    let settings = &config.settings;
    let partition = partition_for_rank(
        &data,
        n_workers,
        rank,
        settings.n_strata,
        settings.seed_load_data,
    )?;
    let draws = run_chain(&SoloContext, &partition, config)?;
    let path = config.output.rank_path(rank);
    write_draw_set(&path, &draws, codec)?;
    info!("rank {rank}: wrote {}", path.display());
    Ok(draws)
}

/// Read the per-rank draw sets and write their combination.
///
/// # Errors
///
/// Returns `QuantError` if a rank file is missing or corrupt, or the draw
/// sets do not combine.
pub fn combine_stage(config: &Config, n_workers: usize) -> Result<DrawSet, QuantError> {
    check_rank(0, n_workers)?;
    let master = read_draw_set(&config.output.rank_path(0))?;
    let workers = (1..n_workers)
        .map(|rank| read_draw_set(&config.output.rank_path(rank)))
        .collect::<Result<Vec<_>, _>>()?;
    let combined = combine_draws(&master, &workers)?;
    write_draw_set(&config.output.path_combined, &combined, config.output.compress.codec())?;
    info!("wrote {}", config.output.path_combined.display());
    Ok(combined)
}

/// Calibrate the combined draw set against the known concentrations and
/// replace the file with the calibrated version. A supervised run sampled
/// its calibration in the chain and is returned unchanged.
///
/// # Errors
///
/// Returns `ConfigError::MissingConcentrations` if no concentration file is
/// configured, and `QuantError` if reading, calibrating or writing fails.
pub fn calibrate_stage(config: &Config) -> Result<DrawSet, QuantError> {
    let known = load_standards(config)?;
    let mut draws = read_draw_set(&config.output.path_combined)?;
    if config.priors.supervised {
        info!("supervised run: keeping the sampled calibration");
        return Ok(draws);
    }
    apply_calibration(&mut draws, &known)?;
    write_draw_set(&config.output.path_combined, &draws, config.output.compress.codec())?;
    Ok(draws)
}

/// Summarize the combined draw set after burn-in and write the summary table.
///
/// # Errors
///
/// Returns `QuantError` if the draw set or name list cannot be read, or the
/// summary cannot be written.
pub fn summarize_stage(config: &Config) -> Result<SummaryReport, QuantError> {
    let draws = read_draw_set(&config.output.path_combined)?;
    let names = config
        .data
        .path_names_proteins
        .as_deref()
        .map(|path| load_names(path, "protein", draws.mu.width()))
        .transpose()?;
    if let Some(path) = config.data.path_names_peptides.as_deref() {
        load_names(path, "peptide", draws.gamma.width())?;
    }
    let report = summarize_draws(&draws, config.settings.burn_in, names.as_deref())?;
    write_summary(&config.output.path_summary, &report)?;
    info!(
        "summarized {} proteins over {} draws into {}",
        report.proteins.len(),
        report.n_draws,
        config.output.path_summary.display()
    );
    Ok(report)
}
