//! Stratified, seeded assignment of proteins to worker ranks.
//!
//! Proteins are ranked by their per-iteration cost (peptides plus observed
//! states), cut into `n_strata` buckets of near-equal size and shuffled
//! within each bucket. Buckets are dealt from the most to the least expensive;
//! each protein goes to the rank with the smallest accumulated cost, ties
//! broken by fewest proteins and then by rank, so proteins of equal cost are
//! dealt round-robin. Every rank receives a mix of cheap and expensive
//! proteins, and the assignment depends only on the data, the worker count
//! and the seed.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

use super::ExperimentData;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    #[error("number of workers must be at least 1")]
    NoWorkers,
    #[error("number of strata must be at least 1")]
    NoStrata,
    #[error("rank {rank} is out of range for {n_workers} workers")]
    RankOutOfRange { rank: usize, n_workers: usize },
}

/// The proteins, peptides and observed states owned by one rank, indexed
/// locally, together with the maps back to global indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub rank: usize,
    pub n_workers: usize,
    pub n_proteins_total: usize,
    pub n_peptides_total: usize,
    /// Global protein index of each local protein, ascending.
    pub protein_indices: Vec<usize>,
    /// Global peptide index of each local peptide, ascending.
    pub peptide_indices: Vec<usize>,
    /// Local protein of each local peptide.
    pub mapping_peptides: Vec<usize>,
    pub intensities_obs: Vec<f64>,
    /// Local peptide of each observed state.
    pub mapping_states_obs: Vec<usize>,
    /// Local protein and known concentration of each standard on this rank.
    pub known_concentrations: Vec<(usize, f64)>,
}

impl Partition {
    #[must_use]
    pub fn n_proteins(&self) -> usize {
        self.protein_indices.len()
    }

    #[must_use]
    pub fn n_peptides(&self) -> usize {
        self.peptide_indices.len()
    }

    #[must_use]
    pub fn n_states_obs(&self) -> usize {
        self.intensities_obs.len()
    }

    /// Observed states per local peptide.
    #[must_use]
    pub fn n_obs_states_per_peptide(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_peptides()];
        for &peptide in &self.mapping_states_obs {
            counts[peptide] += 1;
        }
        counts
    }

    /// Number of local peptides of each local protein.
    #[must_use]
    pub fn n_peptides_per_protein(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_proteins()];
        for &protein in &self.mapping_peptides {
            counts[protein] += 1;
        }
        counts
    }

    /// Restrict the data to the proteins that `assignment` gives to `rank`.
    fn extract(data: &ExperimentData, assignment: &[usize], rank: usize, n_workers: usize) -> Self {
        let mut protein_local = vec![None; data.n_proteins()];
        let mut protein_indices = Vec::new();
        for (protein, &owner) in assignment.iter().enumerate() {
            if owner == rank {
                protein_local[protein] = Some(protein_indices.len());
                protein_indices.push(protein);
            }
        }

        let mut peptide_local = vec![None; data.n_peptides()];
        let mut peptide_indices = Vec::new();
        let mut mapping_peptides = Vec::new();
        for (peptide, &protein) in data.mapping_peptides().iter().enumerate() {
            if let Some(local) = protein_local[protein] {
                peptide_local[peptide] = Some(peptide_indices.len());
                peptide_indices.push(peptide);
                mapping_peptides.push(local);
            }
        }

        let mut intensities_obs = Vec::new();
        let mut mapping_states_obs = Vec::new();
        for (&peptide, &intensity) in data
            .mapping_states_obs()
            .iter()
            .zip(data.intensities_obs().iter())
        {
            if let Some(local) = peptide_local[peptide] {
                mapping_states_obs.push(local);
                intensities_obs.push(intensity);
            }
        }

        let known = data.known_concentrations();
        let known_concentrations = known
            .proteins
            .iter()
            .zip(&known.concentrations)
            .filter_map(|(&protein, &concentration)| {
                protein_local
                    .get(protein)
                    .copied()
                    .flatten()
                    .map(|local| (local, concentration))
            })
            .collect();

        Self {
            rank,
            n_workers,
            n_proteins_total: data.n_proteins(),
            n_peptides_total: data.n_peptides(),
            protein_indices,
            peptide_indices,
            mapping_peptides,
            intensities_obs,
            mapping_states_obs,
            known_concentrations,
        }
    }
}

/// Per-protein cost used for stratification: peptides plus observed states.
#[must_use]
pub fn protein_costs(data: &ExperimentData) -> Vec<usize> {
    let mut costs = vec![0; data.n_proteins()];
    for &protein in data.mapping_peptides() {
        costs[protein] += 1;
    }
    for &peptide in data.mapping_states_obs() {
        costs[data.mapping_peptides()[peptide]] += 1;
    }
    costs
}

/// Owning rank of every protein.
///
/// # Errors
///
/// Returns `PartitionError` if `n_workers` or `n_strata` is zero.
pub fn assign_proteins(
    data: &ExperimentData,
    n_workers: usize,
    n_strata: usize,
    seed: u64,
) -> Result<Vec<usize>, PartitionError> {
    if n_workers == 0 {
        return Err(PartitionError::NoWorkers);
    }
    if n_strata == 0 {
        return Err(PartitionError::NoStrata);
    }

    let costs = protein_costs(data);
    let n_proteins = costs.len();
    let mut order: Vec<usize> = (0..n_proteins).collect();
    order.sort_by_key(|&protein| (costs[protein], protein));

    let n_buckets = n_strata.min(n_proteins).max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut assignment = vec![0; n_proteins];
    // (accumulated cost, proteins dealt, rank)
    let mut ranks: BinaryHeap<Reverse<(usize, usize, usize)>> =
        (0..n_workers).map(|rank| Reverse((0, 0, rank))).collect();
    for bucket in (0..n_buckets).rev() {
        let start = bucket * n_proteins / n_buckets;
        let end = (bucket + 1) * n_proteins / n_buckets;
        let stratum = &mut order[start..end];
        stratum.shuffle(&mut rng);
        for &protein in stratum.iter() {
            if let Some(Reverse((load, dealt, rank))) = ranks.pop() {
                assignment[protein] = rank;
                ranks.push(Reverse((load + costs[protein], dealt + 1, rank)));
            }
        }
    }
    Ok(assignment)
}

/// Partition for a single rank.
///
/// # Errors
///
/// Returns `PartitionError` for a zero worker/strata count or an out-of-range
/// rank.
pub fn partition_for_rank(
    data: &ExperimentData,
    n_workers: usize,
    rank: usize,
    n_strata: usize,
    seed: u64,
) -> Result<Partition, PartitionError> {
    let assignment = assign_proteins(data, n_workers, n_strata, seed)?;
    if rank >= n_workers {
        return Err(PartitionError::RankOutOfRange { rank, n_workers });
    }
    Ok(Partition::extract(data, &assignment, rank, n_workers))
}

/// Partitions for every rank, computed from one assignment.
///
/// # Errors
///
/// Returns `PartitionError` if `n_workers` or `n_strata` is zero.
pub fn partition_all(
    data: &ExperimentData,
    n_workers: usize,
    n_strata: usize,
    seed: u64,
) -> Result<Vec<Partition>, PartitionError> {
    let assignment = assign_proteins(data, n_workers, n_strata, seed)?;
    Ok((0..n_workers)
        .map(|rank| Partition::extract(data, &assignment, rank, n_workers))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::KnownConcentrations;

    fn skewed_data() -> ExperimentData {
        // Protein p has p + 1 peptides, each with two observed states.
        let mut mapping_peptides = Vec::new();
        for protein in 0..12 {
            for _ in 0..=protein {
                mapping_peptides.push(protein);
            }
        }
        let mut mapping_states = Vec::new();
        let mut intensities = Vec::new();
        for peptide in 0..mapping_peptides.len() {
            for replicate in 0..2 {
                mapping_states.push(peptide);
                intensities.push(10.0 + f64::from(u8::try_from(replicate).unwrap_or(0)));
            }
        }
        ExperimentData::new(intensities, mapping_states, mapping_peptides).expect("valid data")
    }

    #[test]
    fn assignment_is_deterministic() {
        let data = skewed_data();
        let first = assign_proteins(&data, 3, 4, 11).expect("assigns");
        let second = assign_proteins(&data, 3, 4, 11).expect("assigns");
        assert_eq!(first, second);
    }

    #[test]
    fn seeds_permute_within_strata() {
        let data = skewed_data();
        let costs = protein_costs(&data);
        let first = assign_proteins(&data, 3, 1, 11).expect("assigns");
        let second = assign_proteins(&data, 3, 1, 12).expect("assigns");
        assert_ne!(first, second);
        for assignment in [&first, &second] {
            let mut loads = [0_usize; 3];
            for (protein, &rank) in assignment.iter().enumerate() {
                loads[rank] += costs[protein];
            }
            let max = loads.iter().max().copied().unwrap_or(0);
            let min = loads.iter().min().copied().unwrap_or(0);
            assert!(max - min <= costs.iter().max().copied().unwrap_or(0));
        }
    }

    #[test]
    fn equal_costs_are_dealt_round_robin() {
        // Twelve single-peptide proteins with one state each.
        let data = ExperimentData::new(vec![10.0; 12], (0..12).collect(), (0..12).collect())
            .expect("valid data");
        let assignment = assign_proteins(&data, 4, 3, 2).expect("assigns");
        let mut counts = [0; 4];
        for &rank in &assignment {
            counts[rank] += 1;
        }
        assert_eq!(counts, [3, 3, 3, 3]);
    }

    #[test]
    fn partitions_are_disjoint_and_exhaustive() {
        let data = skewed_data();
        for n_workers in 1..=5 {
            let partitions = partition_all(&data, n_workers, 3, 7).expect("partitions");
            let mut seen = vec![0; data.n_proteins()];
            for partition in &partitions {
                for &protein in &partition.protein_indices {
                    seen[protein] += 1;
                }
            }
            assert!(seen.iter().all(|&count| count == 1));
        }
    }

    #[test]
    fn single_rank_matches_full_assignment() {
        let data = skewed_data();
        let all = partition_all(&data, 3, 4, 5).expect("partitions");
        let one = partition_for_rank(&data, 3, 1, 4, 5).expect("partition");
        assert_eq!(all[1], one);
    }

    #[test]
    fn local_mappings_point_back_to_global_indices() {
        let data = skewed_data();
        let partition = partition_for_rank(&data, 2, 0, 3, 1).expect("partition");
        for (local_peptide, &global_peptide) in partition.peptide_indices.iter().enumerate() {
            let local_protein = partition.mapping_peptides[local_peptide];
            assert_eq!(
                partition.protein_indices[local_protein],
                data.mapping_peptides()[global_peptide]
            );
        }
        let expected_states: usize = partition
            .peptide_indices
            .iter()
            .map(|&peptide| data.n_obs_states_per_peptide()[peptide])
            .sum();
        assert_eq!(partition.n_states_obs(), expected_states);
    }

    #[test]
    fn standards_follow_their_proteins() {
        let known = KnownConcentrations {
            proteins: vec![0, 5, 11],
            concentrations: vec![1.0, 2.0, 3.0],
        };
        let data = skewed_data().with_known_concentrations(known).expect("attaches");
        let partitions = partition_all(&data, 3, 2, 4).expect("partitions");
        let mut found: Vec<(usize, f64)> = partitions
            .iter()
            .flat_map(|partition| {
                partition
                    .known_concentrations
                    .iter()
                    .map(|&(local, conc)| (partition.protein_indices[local], conc))
            })
            .collect();
        found.sort_by_key(|&(protein, _)| protein);
        assert_eq!(found, vec![(0, 1.0), (5, 2.0), (11, 3.0)]);
    }

    #[test]
    fn more_workers_than_proteins_gives_empty_partitions() {
        let data = ExperimentData::new(vec![1.0], vec![0], vec![0, 1]).expect("valid");
        let partitions = partition_all(&data, 4, 10, 0).expect("partitions");
        let empty = partitions.iter().filter(|p| p.n_proteins() == 0).count();
        assert_eq!(empty, 2);
        assert!(partitions.iter().all(|p| p.n_peptides_total == 2));
    }

    #[test]
    fn rejects_zero_workers_and_bad_rank() {
        let data = skewed_data();
        assert_eq!(
            assign_proteins(&data, 0, 3, 0),
            Err(PartitionError::NoWorkers)
        );
        assert_eq!(
            partition_for_rank(&data, 2, 2, 3, 0),
            Err(PartitionError::RankOutOfRange {
                rank: 2,
                n_workers: 2
            })
        );
    }
}
