//! Crate-level error wrapping every stage's error type.

use thiserror::Error;

use crate::calibration::CalibrationError;
use crate::combine::CombineError;
use crate::config::ConfigError;
use crate::data::DataError;
use crate::data::partition::PartitionError;
use crate::model::SamplerError;
use crate::parallel::ParallelError;
use crate::storage::StorageError;
use crate::summary::SummaryError;

#[derive(Debug, Error)]
pub enum QuantError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error(transparent)]
    Parallel(#[from] ParallelError),
    #[error(transparent)]
    Combine(#[from] CombineError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
}
