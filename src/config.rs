//! # Configuration
//!
//! JSON experiment description: input paths, output locations, priors,
//! initial values and sampler settings. Decoding is strict about required
//! prior fields; everything that has a sensible default can be omitted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::likelihood::GlmLink;

/// Placeholder replaced by the rank in `output.pattern_worker`.
pub const RANK_PLACEHOLDER: &str = "{rank}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration value `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("input separator must be a single byte, got {0:?}")]
    InvalidSeparator(String),
    #[error("output.pattern_worker must contain `{{rank}}`, got {0:?}")]
    MissingRankPlaceholder(String),
    #[error("number of workers must be at least 1")]
    InvalidWorkerCount,
    #[error("rank {rank} is out of range for {n_workers} workers")]
    RankOutOfRange { rank: usize, n_workers: usize },
    #[error("detached worker runs require settings.synchronize_globals = false")]
    SynchronizedWorker,
    #[error("data.path_concentrations is required for calibration and supervised runs")]
    MissingConcentrations,
}

/// Complete experiment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub output: OutputConfig,
    pub priors: Priors,
    pub init: InitialValues,
    pub settings: Settings,
}

impl Config {
    /// Read, decode and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, decoded or validated.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.data.validate()?;
        self.output.validate()?;
        self.priors.validate()?;
        self.init.validate()?;
        self.settings.validate()?;
        if self.priors.supervised {
            if self.data.path_concentrations.is_none() {
                return Err(ConfigError::MissingConcentrations);
            }
            if !self.settings.synchronize_globals {
                return Err(ConfigError::InvalidValue {
                    field: "priors.supervised",
                    reason: "requires settings.synchronize_globals".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub path_data_state: PathBuf,
    pub path_mapping_peptides: PathBuf,
    #[serde(default)]
    pub path_names_proteins: Option<PathBuf>,
    #[serde(default)]
    pub path_names_peptides: Option<PathBuf>,
    #[serde(default)]
    pub path_concentrations: Option<PathBuf>,
    #[serde(default = "default_separator")]
    pub sep_input: String,
}

fn default_separator() -> String {
    "\t".to_string()
}

impl DataConfig {
    /// The single-byte field delimiter of the input tables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSeparator` unless `sep_input` is one byte.
    pub fn delimiter(&self) -> Result<u8, ConfigError> {
        match self.sep_input.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(ConfigError::InvalidSeparator(self.sep_input.clone())),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.delimiter().map(|_| ())
    }
}

/// Codec for the combined (array) draw-set file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayCompression {
    #[default]
    None,
    Gzip,
    Lzf,
    Szip,
}

/// Codec for the per-rank (object) draw-set files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCompression {
    #[default]
    None,
    Bz2,
    Gz,
}

/// Byte-level codec actually applied by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Plain,
    Gzip(u32),
    Bzip2,
}

const GZIP_FAST: u32 = 1;
const GZIP_DEFAULT: u32 = 6;

impl ArrayCompression {
    #[must_use]
    pub const fn codec(self) -> Codec {
        match self {
            Self::None => Codec::Plain,
            Self::Lzf => Codec::Gzip(GZIP_FAST),
            Self::Gzip | Self::Szip => Codec::Gzip(GZIP_DEFAULT),
        }
    }
}

impl ObjectCompression {
    #[must_use]
    pub const fn codec(self) -> Codec {
        match self {
            Self::None => Codec::Plain,
            Self::Gz => Codec::Gzip(GZIP_DEFAULT),
            Self::Bz2 => Codec::Bzip2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path_master: PathBuf,
    pub pattern_worker: String,
    pub path_combined: PathBuf,
    pub path_summary: PathBuf,
    #[serde(default)]
    pub compress: ArrayCompression,
    #[serde(default)]
    pub compress_pickle: ObjectCompression,
}

impl OutputConfig {
    /// Output path of a rank's draw set; rank 0 writes `path_master`.
    #[must_use]
    pub fn rank_path(&self, rank: usize) -> PathBuf {
        if rank == 0 {
            self.path_master.clone()
        } else {
            PathBuf::from(
                self.pattern_worker
                    .replace(RANK_PLACEHOLDER, &rank.to_string()),
            )
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.pattern_worker.contains(RANK_PLACEHOLDER) {
            return Err(ConfigError::MissingRankPlaceholder(
                self.pattern_worker.clone(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NormalPrior {
    pub prior_mean: f64,
    pub prior_prec: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BetaPrior {
    pub prior_a: f64,
    pub prior_b: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GammaPrior {
    pub shape: f64,
    pub rate: f64,
}

/// Hyperpriors of an inverse-gamma variance distribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VarianceDistPrior {
    pub prior_shape: GammaPrior,
    pub prior_rate: GammaPrior,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuccessPrior {
    pub a: f64,
    pub b: f64,
}

/// Hyperpriors of the negative-binomial number-of-states distribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NStatesPrior {
    pub prior_r: GammaPrior,
    pub prior_p: SuccessPrior,
}

/// Optional Cauchy-type prior on the censoring slope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EtaPrior {
    #[serde(default)]
    pub prior_scale: Option<f64>,
    #[serde(default)]
    pub prior_center: Option<f64>,
}

/// Independent normal priors on the intercept and slope of the calibration
/// line. The default precision of zero is flat.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinePrior {
    pub prior_mean: [f64; 2],
    pub prior_prec: [f64; 2],
}

/// `Gamma(prior_shape, prior_rate)` prior on the precision of the unknown
/// concentrations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrecisionPrior {
    pub prior_shape: f64,
    pub prior_rate: f64,
}

impl Default for PrecisionPrior {
    fn default() -> Self {
        Self {
            prior_shape: 1.0,
            prior_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Priors {
    pub mu: NormalPrior,
    pub p_rnd_cen: BetaPrior,
    pub sigmasq_dist: VarianceDistPrior,
    pub tausq_dist: VarianceDistPrior,
    pub n_states_dist: NStatesPrior,
    #[serde(default)]
    pub eta: EtaPrior,
    #[serde(default)]
    pub glm_link: GlmLink,
    /// Sample the calibration line and the concentrations inside the chain,
    /// with the standards held at their known concentrations.
    #[serde(default)]
    pub supervised: bool,
    /// Give the unknown concentrations a normal distribution whose mean and
    /// precision are sampled as well. Without it their prior is flat.
    #[serde(default)]
    pub concentration_dist: bool,
    #[serde(default)]
    pub beta_concentration: LinePrior,
    #[serde(default)]
    pub prec_concentration: PrecisionPrior,
}

impl Priors {
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("priors.mu.prior_prec", self.mu.prior_prec)?;
        require_finite("priors.mu.prior_mean", self.mu.prior_mean)?;
        require_positive("priors.p_rnd_cen.prior_a", self.p_rnd_cen.prior_a)?;
        require_positive("priors.p_rnd_cen.prior_b", self.p_rnd_cen.prior_b)?;
        for (name, prior) in [
            ("priors.sigmasq_dist", self.sigmasq_dist),
            ("priors.tausq_dist", self.tausq_dist),
        ] {
            for value in [
                prior.prior_shape.shape,
                prior.prior_shape.rate,
                prior.prior_rate.shape,
                prior.prior_rate.rate,
            ] {
                require_positive(name, value)?;
            }
        }
        require_positive("priors.n_states_dist.prior_r.shape", self.n_states_dist.prior_r.shape)?;
        require_positive("priors.n_states_dist.prior_r.rate", self.n_states_dist.prior_r.rate)?;
        require_positive("priors.n_states_dist.prior_p.a", self.n_states_dist.prior_p.a)?;
        require_positive("priors.n_states_dist.prior_p.b", self.n_states_dist.prior_p.b)?;
        if let Some(scale) = self.eta.prior_scale {
            require_positive("priors.eta.prior_scale", scale)?;
        }
        if let Some(center) = self.eta.prior_center {
            require_finite("priors.eta.prior_center", center)?;
        }
        for (mean, prec) in self
            .beta_concentration
            .prior_mean
            .into_iter()
            .zip(self.beta_concentration.prior_prec)
        {
            require_finite("priors.beta_concentration.prior_mean", mean)?;
            if !(prec >= 0.0 && prec.is_finite()) {
                return Err(ConfigError::InvalidValue {
                    field: "priors.beta_concentration.prior_prec",
                    reason: format!("must be non-negative and finite, got {prec}"),
                });
            }
        }
        require_positive(
            "priors.prec_concentration.prior_shape",
            self.prec_concentration.prior_shape,
        )?;
        require_positive(
            "priors.prec_concentration.prior_rate",
            self.prec_concentration.prior_rate,
        )?;
        if self.concentration_dist && !self.supervised {
            return Err(ConfigError::InvalidValue {
                field: "priors.concentration_dist",
                reason: "only applies with priors.supervised".to_string(),
            });
        }
        Ok(())
    }
}

/// Shape and rate of an inverse-gamma distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverseGammaParams {
    pub shape: f64,
    pub rate: f64,
}

/// Bivariate normal used to draw the initial censoring coefficients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EtaInit {
    pub mean: [f64; 2],
    pub sd: [f64; 2],
    #[serde(default)]
    pub cor: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InitialValues {
    pub p_rnd_cen: f64,
    pub eta: EtaInit,
    pub sigmasq_dist: InverseGammaParams,
    pub tausq_dist: InverseGammaParams,
}

impl InitialValues {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.p_rnd_cen > 0.0 && self.p_rnd_cen < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "init.p_rnd_cen",
                reason: format!("must lie in (0, 1), got {}", self.p_rnd_cen),
            });
        }
        for value in self.eta.mean {
            require_finite("init.eta.mean", value)?;
        }
        for value in self.eta.sd {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::InvalidValue {
                    field: "init.eta.sd",
                    reason: format!("must be non-negative, got {value}"),
                });
            }
        }
        if !(self.eta.cor.abs() <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "init.eta.cor",
                reason: format!("must lie in [-1, 1], got {}", self.eta.cor),
            });
        }
        require_positive("init.sigmasq_dist.shape", self.sigmasq_dist.shape)?;
        require_positive("init.sigmasq_dist.rate", self.sigmasq_dist.rate)?;
        require_positive("init.tausq_dist.shape", self.tausq_dist.shape)?;
        require_positive("init.tausq_dist.rate", self.tausq_dist.rate)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Settings {
    pub burn_in: usize,
    pub n_iterations: usize,
    /// Degrees of freedom of the Student-t proposal for the censoring
    /// coefficients.
    #[serde(default = "default_prop_df_eta", alias = "propDf")]
    pub prop_df_eta: f64,
    /// Degrees of freedom of the Student-t proposal used when imputing
    /// intensity-censored states falls back to Metropolis-Hastings.
    #[serde(default = "default_prop_df_y_mis")]
    pub prop_df_y_mis: f64,
    #[serde(default = "default_n_strata")]
    pub n_strata: usize,
    #[serde(default)]
    pub seed_load_data: u64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_true")]
    pub synchronize_globals: bool,
    #[serde(default = "default_prop_scale")]
    pub prop_scale_shape: f64,
    #[serde(default = "default_prop_scale")]
    pub prop_scale_r: f64,
    #[serde(default)]
    pub verbose: u8,
    #[serde(default = "default_verbose_interval")]
    pub verbose_interval: usize,
}

const fn default_prop_df_eta() -> f64 {
    10.0
}

const fn default_prop_df_y_mis() -> f64 {
    5.0
}

const fn default_n_strata() -> usize {
    10
}

const fn default_true() -> bool {
    true
}

const fn default_prop_scale() -> f64 {
    0.1
}

const fn default_verbose_interval() -> usize {
    100
}

impl Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.n_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "settings.n_iterations",
                reason: "must be positive".to_string(),
            });
        }
        if self.burn_in >= self.n_iterations {
            return Err(ConfigError::InvalidValue {
                field: "settings.burn_in",
                reason: format!(
                    "burn-in ({}) must be smaller than iterations ({})",
                    self.burn_in, self.n_iterations
                ),
            });
        }
        if self.n_strata == 0 {
            return Err(ConfigError::InvalidValue {
                field: "settings.n_strata",
                reason: "must be positive".to_string(),
            });
        }
        if self.verbose_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "settings.verbose_interval",
                reason: "must be positive".to_string(),
            });
        }
        require_positive("settings.prop_df_eta", self.prop_df_eta)?;
        require_positive("settings.prop_df_y_mis", self.prop_df_y_mis)?;
        require_positive("settings.prop_scale_shape", self.prop_scale_shape)?;
        require_positive("settings.prop_scale_r", self.prop_scale_r)
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("must be positive and finite, got {value}"),
        })
    }
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("must be finite, got {value}"),
        })
    }
}

/// Check a worker count and rank pair given on the command line.
///
/// # Errors
///
/// Returns `ConfigError` if `n_workers == 0` or `rank >= n_workers`.
pub fn check_rank(rank: usize, n_workers: usize) -> Result<(), ConfigError> {
    if n_workers == 0 {
        return Err(ConfigError::InvalidWorkerCount);
    }
    if rank >= n_workers {
        return Err(ConfigError::RankOutOfRange { rank, n_workers });
    }
    Ok(())
}
