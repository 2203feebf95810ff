//! Iteration-major draw storage for one partition (or the combined run).

use serde::{Deserialize, Serialize};

use crate::data::partition::Partition;
use crate::inference::AcceptanceStats;

use super::sampler::LocalState;
use super::state::GlobalParams;
use super::supervision::SupervisionParams;

/// A dense `n_iterations x width` trace stored row by row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace<T> {
    n_iterations: usize,
    width: usize,
    values: Vec<T>,
}

impl<T: Copy + Default> Trace<T> {
    #[must_use]
    pub fn zeros(n_iterations: usize, width: usize) -> Self {
        Self {
            n_iterations,
            width,
            values: vec![T::default(); n_iterations * width],
        }
    }

    /// Build a trace from rows of equal length; `None` if lengths differ.
    #[must_use]
    pub fn from_rows(rows: &[Vec<T>]) -> Option<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return None;
        }
        Some(Self {
            n_iterations: rows.len(),
            width,
            values: rows.iter().flatten().copied().collect(),
        })
    }

    #[must_use]
    pub const fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn row(&self, iteration: usize) -> &[T] {
        &self.values[iteration * self.width..(iteration + 1) * self.width]
    }

    pub fn set_row(&mut self, iteration: usize, values: &[T]) {
        self.values[iteration * self.width..(iteration + 1) * self.width].copy_from_slice(values);
    }

    #[must_use]
    pub fn get(&self, iteration: usize, column: usize) -> T {
        self.values[iteration * self.width + column]
    }

    pub fn set(&mut self, iteration: usize, column: usize, value: T) {
        self.values[iteration * self.width + column] = value;
    }

    /// All draws of one column, in iteration order.
    #[must_use]
    pub fn column(&self, column: usize) -> Vec<T> {
        (0..self.n_iterations)
            .map(|iteration| self.get(iteration, column))
            .collect()
    }

    /// Whether the stored buffer agrees with the declared shape.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.values.len() == self.n_iterations * self.width
    }
}

/// Which part of the global index space a draw set covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTag {
    pub rank: usize,
    pub n_workers: usize,
    pub n_proteins_total: usize,
    pub n_peptides_total: usize,
    pub protein_indices: Vec<usize>,
    pub peptide_indices: Vec<usize>,
    /// Local protein of each local peptide.
    pub mapping_peptides: Vec<usize>,
}

impl PartitionTag {
    #[must_use]
    pub fn from_partition(partition: &Partition) -> Self {
        Self {
            rank: partition.rank,
            n_workers: partition.n_workers,
            n_proteins_total: partition.n_proteins_total,
            n_peptides_total: partition.n_peptides_total,
            protein_indices: partition.protein_indices.clone(),
            peptide_indices: partition.peptide_indices.clone(),
            mapping_peptides: partition.mapping_peptides.clone(),
        }
    }
}

/// Traces of the parameters shared by every protein.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTraces {
    pub eta: Trace<f64>,
    pub p_rnd_cen: Vec<f64>,
    pub shape_sigmasq: Vec<f64>,
    pub rate_sigmasq: Vec<f64>,
    pub shape_tausq: Vec<f64>,
    pub rate_tausq: Vec<f64>,
    pub r: Vec<f64>,
    pub lmbda: Vec<f64>,
}

impl GlobalTraces {
    fn zeros(n_iterations: usize) -> Self {
        Self {
            eta: Trace::zeros(n_iterations, 2),
            p_rnd_cen: vec![0.0; n_iterations],
            shape_sigmasq: vec![0.0; n_iterations],
            rate_sigmasq: vec![0.0; n_iterations],
            shape_tausq: vec![0.0; n_iterations],
            rate_tausq: vec![0.0; n_iterations],
            r: vec![0.0; n_iterations],
            lmbda: vec![0.0; n_iterations],
        }
    }

    fn record(&mut self, iteration: usize, params: &GlobalParams) {
        self.eta.set_row(iteration, &params.eta);
        self.p_rnd_cen[iteration] = params.p_rnd_cen;
        self.shape_sigmasq[iteration] = params.sigmasq_dist.shape;
        self.rate_sigmasq[iteration] = params.sigmasq_dist.rate;
        self.shape_tausq[iteration] = params.tausq_dist.shape;
        self.rate_tausq[iteration] = params.tausq_dist.rate;
        self.r[iteration] = params.n_states_dist.r;
        self.lmbda[iteration] = params.n_states_dist.lmbda;
    }

    /// Named scalar traces, for summaries.
    #[must_use]
    pub fn named(&self) -> Vec<(&'static str, Vec<f64>)> {
        vec![
            ("eta0", self.eta.column(0)),
            ("eta1", self.eta.column(1)),
            ("p_rnd_cen", self.p_rnd_cen.clone()),
            ("shape_sigmasq", self.shape_sigmasq.clone()),
            ("rate_sigmasq", self.rate_sigmasq.clone()),
            ("shape_tausq", self.shape_tausq.clone()),
            ("rate_tausq", self.rate_tausq.clone()),
            ("r", self.r.clone()),
            ("lmbda", self.lmbda.clone()),
        ]
    }

    fn lengths(&self) -> [usize; 8] {
        [
            self.eta.n_iterations(),
            self.p_rnd_cen.len(),
            self.shape_sigmasq.len(),
            self.rate_sigmasq.len(),
            self.shape_tausq.len(),
            self.rate_tausq.len(),
            self.r.len(),
            self.lmbda.len(),
        ]
    }
}

/// Calibration output: per-draw coefficients and calibrated concentrations,
/// either computed after the run or sampled inside a supervised chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDraws {
    /// `n_iterations x 2`, columns `beta0` and `beta1`.
    pub beta: Trace<f64>,
    /// `n_iterations x n_proteins`.
    pub concentration: Trace<f64>,
    /// `n_iterations x 2`, mean and variance of the unknown concentrations.
    /// Only sampled when the concentrations share a hierarchical prior.
    #[serde(default)]
    pub concentration_dist: Option<Trace<f64>>,
}

impl CalibrationDraws {
    #[must_use]
    pub fn zeros(n_iterations: usize, n_proteins: usize, concentration_dist: bool) -> Self {
        Self {
            beta: Trace::zeros(n_iterations, 2),
            concentration: Trace::zeros(n_iterations, n_proteins),
            concentration_dist: concentration_dist.then(|| Trace::zeros(n_iterations, 2)),
        }
    }
}

/// All draws of one sampler run, tagged with the partition it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawSet {
    pub tag: PartitionTag,
    pub synchronized: bool,
    pub mu: Trace<f64>,
    pub sigmasq: Trace<f64>,
    pub tausq: Trace<f64>,
    pub gamma: Trace<f64>,
    pub n_cen_states_per_peptide: Trace<u32>,
    pub globals: GlobalTraces,
    pub acceptance: AcceptanceStats,
    #[serde(default)]
    pub calibration: Option<CalibrationDraws>,
}

impl DrawSet {
    /// Storage for `n_iterations` draws of the tagged partition.
    #[must_use]
    pub fn allocate(tag: PartitionTag, n_iterations: usize, synchronized: bool) -> Self {
        let n_proteins = tag.protein_indices.len();
        let n_peptides = tag.peptide_indices.len();
        Self {
            tag,
            synchronized,
            mu: Trace::zeros(n_iterations, n_proteins),
            sigmasq: Trace::zeros(n_iterations, n_proteins),
            tausq: Trace::zeros(n_iterations, n_proteins),
            gamma: Trace::zeros(n_iterations, n_peptides),
            n_cen_states_per_peptide: Trace::zeros(n_iterations, n_peptides),
            globals: GlobalTraces::zeros(n_iterations),
            acceptance: AcceptanceStats::default(),
            calibration: None,
        }
    }

    #[must_use]
    pub const fn n_iterations(&self) -> usize {
        self.mu.n_iterations()
    }

    pub fn record(&mut self, iteration: usize, local: &LocalState, globals: &GlobalParams) {
        self.mu.set_row(iteration, &local.mu);
        self.sigmasq.set_row(iteration, &local.sigmasq);
        self.tausq.set_row(iteration, &local.tausq);
        self.gamma.set_row(iteration, &local.gamma);
        self.n_cen_states_per_peptide
            .set_row(iteration, &local.n_cen_states_per_peptide);
        self.globals.record(iteration, globals);
    }

    /// Allocate the in-chain calibration block of a supervised run.
    pub fn enable_supervision(&mut self, concentration_dist: bool) {
        self.calibration = Some(CalibrationDraws::zeros(
            self.n_iterations(),
            self.mu.width(),
            concentration_dist,
        ));
    }

    /// Record the line and concentrations of a supervised iteration. A no-op
    /// unless [`DrawSet::enable_supervision`] was called.
    pub fn record_supervision(
        &mut self,
        iteration: usize,
        concentration: &[f64],
        params: &SupervisionParams,
    ) {
        let Some(calibration) = self.calibration.as_mut() else {
            return;
        };
        calibration.beta.set_row(iteration, &params.beta);
        calibration.concentration.set_row(iteration, concentration);
        if let Some(dist) = calibration.concentration_dist.as_mut() {
            dist.set_row(
                iteration,
                &[params.mean_concentration, 1.0 / params.prec_concentration],
            );
        }
    }

    /// Check every trace against the iteration count and the partition tag.
    ///
    /// # Errors
    ///
    /// Returns a description of the first inconsistency found.
    pub fn check_shape(&self) -> Result<(), String> {
        let n_iterations = self.n_iterations();
        let n_proteins = self.tag.protein_indices.len();
        let n_peptides = self.tag.peptide_indices.len();
        let protein_traces = [
            ("mu", &self.mu),
            ("sigmasq", &self.sigmasq),
            ("tausq", &self.tausq),
        ];
        for (name, trace) in protein_traces {
            check_trace(name, trace, n_iterations, n_proteins)?;
        }
        check_trace("gamma", &self.gamma, n_iterations, n_peptides)?;
        check_trace(
            "n_cen_states_per_peptide",
            &self.n_cen_states_per_peptide,
            n_iterations,
            n_peptides,
        )?;
        if self.globals.eta.width() != 2 || !self.globals.eta.is_consistent() {
            return Err("eta trace must have two columns".to_string());
        }
        if let Some(length) = self
            .globals
            .lengths()
            .into_iter()
            .find(|&length| length != n_iterations)
        {
            return Err(format!(
                "global trace has {length} draws, expected {n_iterations}"
            ));
        }
        if self.tag.mapping_peptides.len() != n_peptides {
            return Err(format!(
                "peptide mapping has {} entries for {n_peptides} peptides",
                self.tag.mapping_peptides.len()
            ));
        }
        if let Some(&protein) = self
            .tag
            .mapping_peptides
            .iter()
            .find(|&&protein| protein >= n_proteins)
        {
            return Err(format!(
                "peptide mapped to local protein {protein} of {n_proteins}"
            ));
        }
        if let Some(calibration) = &self.calibration {
            check_trace("beta", &calibration.beta, n_iterations, 2)?;
            check_trace(
                "concentration",
                &calibration.concentration,
                n_iterations,
                n_proteins,
            )?;
            if let Some(dist) = &calibration.concentration_dist {
                check_trace("concentration_dist", dist, n_iterations, 2)?;
            }
        }
        Ok(())
    }
}

fn check_trace<T: Copy + Default>(
    name: &str,
    trace: &Trace<T>,
    n_iterations: usize,
    width: usize,
) -> Result<(), String> {
    if !trace.is_consistent() {
        return Err(format!("{name} buffer does not match its declared shape"));
    }
    if trace.n_iterations() != n_iterations || trace.width() != width {
        return Err(format!(
            "{name} has shape {}x{}, expected {n_iterations}x{width}",
            trace.n_iterations(),
            trace.width()
        ));
    }
    Ok(())
}
