#![forbid(unsafe_code)]

//! # `protein_quant`
//!
//! Absolute protein quantitation from LC/MSMS peptide intensities with a
//! hierarchical censored-state model fit by MCMC.
//!
//! Proteins are partitioned across ranks, each rank samples its own proteins
//! and the shared global parameters are either synchronized through a
//! [`parallel::ParallelContext`] or run independently per rank. Per-rank draw
//! sets are combined, calibrated against proteins of known concentration and
//! summarized. Every stage is also available as a binary under `src/bin`.

pub mod calibration;
pub mod cli;
pub mod combine;
pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod model;
pub mod parallel;
pub mod pipeline;
pub mod storage;
pub mod summary;
pub mod utils;

pub use calibration::{CalibrationError, apply_calibration, calibrate};
pub use combine::{CombineError, combine_draws};
pub use config::{Config, ConfigError};
pub use data::partition::{
    Partition, PartitionError, assign_proteins, partition_all, partition_for_rank, protein_costs,
};
pub use data::{DataError, ExperimentData, KnownConcentrations};
pub use error::QuantError;
pub use inference::{AcceptanceStats, ProposalStats};
pub use model::{DrawSet, GlmLink, PartitionSampler, SamplerError, Trace};
pub use parallel::{ParallelContext, ParallelError, SoloContext, ThreadCluster, run_chain, run_parallel};
pub use storage::{StorageError, read_draw_set, write_draw_set};
pub use summary::{SummaryError, SummaryReport, summarize_draws};
