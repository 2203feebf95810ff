//! Merge per-rank draw sets into one draw set over the global index space.

use log::info;
use thiserror::Error;

use crate::model::{CalibrationDraws, DrawSet, PartitionTag, Trace};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CombineError {
    #[error("draw sets do not fit together: {0}")]
    ShapeMismatch(String),
    #[error("the master draw set must come from rank 0, got rank {0}")]
    MasterNotRankZero(usize),
    #[error("rank {0} appears more than once")]
    DuplicateRank(usize),
}

fn mismatch(message: impl Into<String>) -> CombineError {
    CombineError::ShapeMismatch(message.into())
}

/// Check that the given local-to-global maps cover `0..total` exactly once.
fn check_coverage<'a>(
    kind: &str,
    total: usize,
    maps: impl Iterator<Item = &'a [usize]>,
) -> Result<(), CombineError> {
    let mut seen = vec![false; total];
    for map in maps {
        for &index in map {
            let slot = seen
                .get_mut(index)
                .ok_or_else(|| mismatch(format!("{kind} index {index} out of range 0..{total}")))?;
            if *slot {
                return Err(mismatch(format!("{kind} {index} sampled by more than one rank")));
            }
            *slot = true;
        }
    }
    match seen.iter().position(|&covered| !covered) {
        Some(missing) => Err(mismatch(format!("{kind} {missing} not sampled by any rank"))),
        None => Ok(()),
    }
}

fn validate(master: &DrawSet, workers: &[DrawSet]) -> Result<(), CombineError> {
    if master.tag.rank != 0 {
        return Err(CombineError::MasterNotRankZero(master.tag.rank));
    }
    let n_iterations = master.n_iterations();
    let mut ranks = vec![false; master.tag.n_workers.max(1)];
    for set in std::iter::once(master).chain(workers) {
        set.check_shape()
            .map_err(|reason| mismatch(format!("rank {}: {reason}", set.tag.rank)))?;
        if set.n_iterations() != n_iterations {
            return Err(mismatch(format!(
                "rank {} has {} iterations, master has {n_iterations}",
                set.tag.rank,
                set.n_iterations()
            )));
        }
        if set.tag.n_workers != master.tag.n_workers
            || set.tag.n_proteins_total != master.tag.n_proteins_total
            || set.tag.n_peptides_total != master.tag.n_peptides_total
        {
            return Err(mismatch(format!(
                "rank {} was partitioned differently from the master",
                set.tag.rank
            )));
        }
        if set.synchronized != master.synchronized {
            return Err(mismatch(format!(
                "rank {} disagrees with the master on global synchronization",
                set.tag.rank
            )));
        }
        let supervision = |set: &DrawSet| {
            set.calibration
                .as_ref()
                .map(|calibration| calibration.concentration_dist.is_some())
        };
        if supervision(set) != supervision(master) {
            return Err(mismatch(format!(
                "rank {} disagrees with the master on sampled concentrations",
                set.tag.rank
            )));
        }
        let slot = ranks.get_mut(set.tag.rank).ok_or_else(|| {
            mismatch(format!(
                "rank {} out of range for {} workers",
                set.tag.rank, master.tag.n_workers
            ))
        })?;
        if *slot {
            return Err(CombineError::DuplicateRank(set.tag.rank));
        }
        *slot = true;
    }

    let sets = || std::iter::once(master).chain(workers);
    check_coverage(
        "protein",
        master.tag.n_proteins_total,
        sets().map(|set| set.tag.protein_indices.as_slice()),
    )?;
    check_coverage(
        "peptide",
        master.tag.n_peptides_total,
        sets().map(|set| set.tag.peptide_indices.as_slice()),
    )
}

fn scatter<T: Copy + Default>(target: &mut Trace<T>, source: &Trace<T>, columns: &[usize]) {
    for iteration in 0..source.n_iterations() {
        for (local, &global) in columns.iter().enumerate() {
            target.set(iteration, global, source.get(iteration, local));
        }
    }
}

/// Combine the master's draw set with those of the other ranks.
///
/// Local traces land verbatim in their global columns and the global traces
/// come from the master, as do the line and concentration distribution of a
/// supervised run. Acceptance counts come from the master in a
/// synchronized run and are summed across ranks otherwise.
///
/// # Errors
///
/// Returns `CombineError` if the inputs do not tile the global index space
/// or disagree in shape.
pub fn combine_draws(master: &DrawSet, workers: &[DrawSet]) -> Result<DrawSet, CombineError> {
    validate(master, workers)?;

    let n_proteins = master.tag.n_proteins_total;
    let n_peptides = master.tag.n_peptides_total;
    let mut mapping_peptides = vec![0; n_peptides];
    for set in std::iter::once(master).chain(workers) {
        for (local, &peptide) in set.tag.peptide_indices.iter().enumerate() {
            mapping_peptides[peptide] = set.tag.protein_indices[set.tag.mapping_peptides[local]];
        }
    }
    let tag = PartitionTag {
        rank: 0,
        n_workers: 1,
        n_proteins_total: n_proteins,
        n_peptides_total: n_peptides,
        protein_indices: (0..n_proteins).collect(),
        peptide_indices: (0..n_peptides).collect(),
        mapping_peptides,
    };

    let mut combined = DrawSet::allocate(tag, master.n_iterations(), master.synchronized);
    combined.calibration = master.calibration.as_ref().map(|calibration| CalibrationDraws {
        beta: calibration.beta.clone(),
        concentration: Trace::zeros(master.n_iterations(), n_proteins),
        concentration_dist: calibration.concentration_dist.clone(),
    });
    for set in std::iter::once(master).chain(workers) {
        let proteins = &set.tag.protein_indices;
        let peptides = &set.tag.peptide_indices;
        scatter(&mut combined.mu, &set.mu, proteins);
        scatter(&mut combined.sigmasq, &set.sigmasq, proteins);
        scatter(&mut combined.tausq, &set.tausq, proteins);
        scatter(&mut combined.gamma, &set.gamma, peptides);
        scatter(
            &mut combined.n_cen_states_per_peptide,
            &set.n_cen_states_per_peptide,
            peptides,
        );
        if let (Some(target), Some(source)) = (combined.calibration.as_mut(), &set.calibration) {
            scatter(&mut target.concentration, &source.concentration, proteins);
        }
    }
    combined.globals = master.globals.clone();
    combined.acceptance = if master.synchronized {
        master.acceptance
    } else {
        workers
            .iter()
            .fold(master.acceptance, |acc, set| acc.merged(set.acceptance))
    };

    info!(
        "combined {} ranks into {n_proteins} proteins x {} draws",
        workers.len() + 1,
        combined.n_iterations()
    );
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A draw set over the given proteins, one peptide per protein, whose
    /// `mu` draws encode `100 * protein + iteration`.
    fn rank_set(rank: usize, n_workers: usize, proteins: &[usize], n_total: usize) -> DrawSet {
        let tag = PartitionTag {
            rank,
            n_workers,
            n_proteins_total: n_total,
            n_peptides_total: n_total,
            protein_indices: proteins.to_vec(),
            peptide_indices: proteins.to_vec(),
            mapping_peptides: (0..proteins.len()).collect(),
        };
        let mut set = DrawSet::allocate(tag, 3, true);
        for iteration in 0..3 {
            for (local, &protein) in proteins.iter().enumerate() {
                let value = f64::from(u32::try_from(100 * protein + iteration).unwrap_or(0));
                set.mu.set(iteration, local, value);
            }
        }
        set.globals.r = vec![1.0, 2.0, 3.0];
        set.acceptance.eta.proposed = if rank == 0 { 2 } else { 0 };
        set
    }

    #[test]
    fn scatters_local_columns_to_global_positions() {
        let master = rank_set(0, 2, &[1, 3], 4);
        let worker = rank_set(1, 2, &[0, 2], 4);
        let combined = combine_draws(&master, &[worker]).expect("combines");
        for protein in 0..4 {
            for iteration in 0..3 {
                let expected = f64::from(u32::try_from(100 * protein + iteration).unwrap_or(0));
                assert_eq!(combined.mu.get(iteration, protein), expected);
            }
        }
        assert_eq!(combined.tag.mapping_peptides, vec![0, 1, 2, 3]);
        assert_eq!(combined.globals.r, vec![1.0, 2.0, 3.0]);
        assert_eq!(combined.acceptance.eta.proposed, 2);
        assert!(combined.check_shape().is_ok());
    }

    #[test]
    fn independent_runs_sum_acceptance_counts() {
        let mut master = rank_set(0, 2, &[0], 2);
        let mut worker = rank_set(1, 2, &[1], 2);
        master.synchronized = false;
        worker.synchronized = false;
        worker.acceptance.eta.proposed = 5;
        let combined = combine_draws(&master, &[worker]).expect("combines");
        assert_eq!(combined.acceptance.eta.proposed, 7);
    }

    #[test]
    fn missing_protein_is_a_shape_mismatch() {
        let master = rank_set(0, 2, &[0], 3);
        let worker = rank_set(1, 2, &[2], 3);
        assert!(matches!(
            combine_draws(&master, &[worker]),
            Err(CombineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn duplicated_protein_is_a_shape_mismatch() {
        let master = rank_set(0, 2, &[0, 1], 2);
        let worker = rank_set(1, 2, &[1], 2);
        assert!(matches!(
            combine_draws(&master, &[worker]),
            Err(CombineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn differing_iteration_counts_are_rejected() {
        let master = rank_set(0, 2, &[0], 2);
        let mut worker = rank_set(1, 2, &[1], 2);
        let tag = worker.tag.clone();
        worker = DrawSet::allocate(tag, 4, true);
        assert!(matches!(
            combine_draws(&master, &[worker]),
            Err(CombineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn master_must_be_rank_zero_and_ranks_distinct() {
        let master = rank_set(1, 2, &[0], 2);
        let worker = rank_set(0, 2, &[1], 2);
        assert_eq!(
            combine_draws(&master, &[worker]),
            Err(CombineError::MasterNotRankZero(1))
        );
        let master = rank_set(0, 3, &[0], 3);
        let first = rank_set(1, 3, &[1], 3);
        let second = rank_set(1, 3, &[2], 3);
        assert_eq!(
            combine_draws(&master, &[first, second]),
            Err(CombineError::DuplicateRank(1))
        );
    }

    #[test]
    fn sampled_concentrations_are_scattered_and_the_line_shared() {
        let mut master = rank_set(0, 2, &[1], 2);
        let mut worker = rank_set(1, 2, &[0], 2);
        for (set, concentration) in [(&mut master, 7.0), (&mut worker, 3.0)] {
            set.enable_supervision(true);
            let calibration = set.calibration.as_mut().expect("supervised block");
            calibration.concentration.set(2, 0, concentration);
            calibration.beta.set(2, 1, 0.5);
        }
        let combined = combine_draws(&master, &[worker.clone()]).expect("combines");
        let calibration = combined.calibration.as_ref().expect("combined block");
        assert_eq!(calibration.concentration.row(2), &[3.0, 7.0]);
        assert_eq!(calibration.beta.get(2, 1), 0.5);
        assert!(calibration.concentration_dist.is_some());
        assert!(combined.check_shape().is_ok());

        worker.calibration = None;
        assert!(matches!(
            combine_draws(&master, &[worker]),
            Err(CombineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn single_rank_combines_to_itself() {
        let master = rank_set(0, 1, &[0, 1], 2);
        let combined = combine_draws(&master, &[]).expect("combines");
        assert_eq!(combined.mu, master.mu);
        assert_eq!(combined.acceptance, master.acceptance);
    }
}
