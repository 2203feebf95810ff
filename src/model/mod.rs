//! # Hierarchical censored-state model
//!
//! Proteins carry a mean `mu` and two variances: `sigmasq` for states around
//! their peptide effect and `tausq` for peptide effects `gamma` around `mu`.
//! Each peptide has a latent number of states, some of which are censored
//! either at random (`p_rnd_cen`) or through their intensity, with the
//! observation probability `F(eta0 + eta1 * y)`.
//!
//! In a supervised run the protein means follow a calibration line in the
//! protein concentrations (see [`supervision`]).
//!
//! [`sampler::PartitionSampler`] owns the partition-local state and never
//! communicates; [`globals::GlobalUpdater`] performs the updates of shared
//! parameters from aggregated sufficient statistics. The parallel
//! orchestrator glues the two together.

pub mod censoring;
pub mod distributions;
pub mod draws;
pub mod globals;
pub mod glm;
pub mod likelihood;
pub mod priors;
pub mod sampler;
pub mod state;
pub mod supervision;

use thiserror::Error;

pub use draws::{CalibrationDraws, DrawSet, GlobalTraces, PartitionTag, Trace};
pub use globals::GlobalUpdater;
pub use glm::{CensoringFit, fit_censoring_glm};
pub use likelihood::GlmLink;
pub use sampler::{LocalState, PartitionSampler};
pub use state::{GlobalBroadcast, GlobalParams, GlmTerms, LocalSummary, NegBinomialParams};
pub use supervision::{ConcentrationMoments, LineTerms, SupervisionParams};

/// Fatal sampler conditions. Any of these indicates a numeric or modeling
/// failure rather than something to retry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplerError {
    #[error("{parameter} of protein {protein} became non-positive or non-finite ({value})")]
    NonPositiveVariance {
        parameter: &'static str,
        protein: usize,
        value: f64,
    },
    #[error("global parameter {parameter} became invalid ({value})")]
    InvalidGlobal { parameter: &'static str, value: f64 },
    #[error("malformed message: expected {expected} values, found {found}")]
    MalformedMessage { expected: usize, found: usize },
    #[error("the standards and the line prior do not identify the calibration line")]
    UnidentifiedLine,
}
