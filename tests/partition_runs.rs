use protein_quant::config::Config;
use protein_quant::{
    ExperimentData, SoloContext, assign_proteins, partition_all, partition_for_rank,
    protein_costs, run_chain, run_parallel,
};

fn skewed_data(n_proteins: usize) -> ExperimentData {
    let mut mapping_peptides = Vec::new();
    for protein in 0..n_proteins {
        for _ in 0..=(protein % 4) {
            mapping_peptides.push(protein);
        }
    }
    let mut mapping_states = Vec::new();
    let mut intensities = Vec::new();
    for (peptide, &protein) in mapping_peptides.iter().enumerate() {
        for replicate in 0..=(peptide % 3) {
            mapping_states.push(peptide);
            let level = f64::from(u32::try_from(protein + replicate).unwrap_or(0));
            intensities.push(level.mul_add(0.25, 11.0));
        }
    }
    ExperimentData::new(intensities, mapping_states, mapping_peptides).expect("valid data")
}

/// Protein p has 1 + 200 / (p + 1) peptides, each with one observed state.
fn zipf_data(n_proteins: usize) -> (ExperimentData, Vec<usize>) {
    let peptides_per_protein: Vec<usize> = (0..n_proteins).map(|p| 1 + 200 / (p + 1)).collect();
    let mut mapping_peptides = Vec::new();
    for (protein, &n_peptides) in peptides_per_protein.iter().enumerate() {
        mapping_peptides.extend(std::iter::repeat_n(protein, n_peptides));
    }
    let n_peptides = mapping_peptides.len();
    let data = ExperimentData::new(vec![12.0; n_peptides], (0..n_peptides).collect(), mapping_peptides)
        .expect("valid data");
    (data, peptides_per_protein)
}

fn config(n_iterations: usize, synchronize_globals: bool) -> Config {
    serde_json::from_value(serde_json::json!({
        "data": {"path_data_state": "unused", "path_mapping_peptides": "unused"},
        "output": {
            "path_master": "unused",
            "pattern_worker": "unused-{rank}",
            "path_combined": "unused",
            "path_summary": "unused"
        },
        "priors": {
            "mu": {"prior_mean": 0.0, "prior_prec": 0.01},
            "p_rnd_cen": {"prior_a": 1.0, "prior_b": 1.0},
            "sigmasq_dist": {
                "prior_shape": {"shape": 2.0, "rate": 1.0},
                "prior_rate": {"shape": 1.0, "rate": 1.0}
            },
            "tausq_dist": {
                "prior_shape": {"shape": 2.0, "rate": 1.0},
                "prior_rate": {"shape": 1.0, "rate": 1.0}
            },
            "n_states_dist": {
                "prior_r": {"shape": 1.0, "rate": 0.1},
                "prior_p": {"a": 1.0, "b": 1.0}
            }
        },
        "init": {
            "p_rnd_cen": 0.1,
            "eta": {"mean": [-2.0, 0.5], "sd": [0.0, 0.0], "cor": 0.0},
            "sigmasq_dist": {"shape": 5.0, "rate": 1.0},
            "tausq_dist": {"shape": 5.0, "rate": 1.0}
        },
        "settings": {
            "burn_in": 0,
            "n_iterations": n_iterations,
            "synchronize_globals": synchronize_globals
        }
    }))
    .expect("config decodes")
}

#[test]
fn every_protein_has_exactly_one_rank_and_costs_are_balanced() {
    let data = skewed_data(23);
    let costs = protein_costs(&data);
    let largest = costs.iter().max().copied().unwrap_or(0);
    for n_workers in [1, 2, 5, 23] {
        let assignment = assign_proteins(&data, n_workers, 4, 9).expect("assigns");
        assert_eq!(assignment.len(), 23);
        let mut loads = vec![0_usize; n_workers];
        for (protein, &rank) in assignment.iter().enumerate() {
            loads[rank] += costs[protein];
        }
        let max = loads.iter().max().copied().unwrap_or(0);
        let min = loads.iter().min().copied().unwrap_or(0);
        assert!(max - min <= largest, "{n_workers} workers: {loads:?}");
    }
}

#[test]
fn peptide_loads_stay_within_one_stratum_of_the_mean() {
    let (data, peptides_per_protein) = zipf_data(400);
    let total: usize = peptides_per_protein.iter().sum();
    let n_strata = 10;
    for n_workers in [2, 4, 8] {
        let assignment = assign_proteins(&data, n_workers, n_strata, 0).expect("assigns");
        let mut loads = vec![0_usize; n_workers];
        for (protein, &rank) in assignment.iter().enumerate() {
            loads[rank] += peptides_per_protein[protein];
        }
        let max = loads.iter().max().copied().unwrap_or(0);
        // max - total / n_workers <= total / n_strata, scaled to integers
        assert!(
            (max * n_workers - total) * n_strata <= total * n_workers,
            "{n_workers} workers: {loads:?} of {total} peptides"
        );
    }
}

#[test]
fn partitions_tile_the_global_index_spaces() {
    let data = skewed_data(10);
    let partitions = partition_all(&data, 3, 3, 1).expect("partitions");
    let mut proteins: Vec<usize> = partitions
        .iter()
        .flat_map(|p| p.protein_indices.iter().copied())
        .collect();
    proteins.sort_unstable();
    assert_eq!(proteins, (0..10).collect::<Vec<_>>());
    let n_peptides: usize = partitions.iter().map(|p| p.n_peptides()).sum();
    let n_states: usize = partitions.iter().map(|p| p.n_states_obs()).sum();
    assert_eq!(n_peptides, data.n_peptides());
    assert_eq!(n_states, data.n_states_obs());
    for partition in &partitions {
        assert!(partition.protein_indices.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn single_rank_partition_matches_the_full_assignment() {
    let data = skewed_data(10);
    let all = partition_all(&data, 4, 2, 5).expect("partitions");
    let second = partition_for_rank(&data, 4, 2, 2, 5).expect("partition");
    assert_eq!(all[2], second);
}

#[test]
fn empty_partition_samples_trivially() {
    let data = skewed_data(2);
    let partition = partition_for_rank(&data, 4, 3, 1, 0).expect("partition");
    assert_eq!(partition.n_proteins(), 0);
    let draws = run_chain(&SoloContext, &partition, &config(12, false)).expect("runs");
    assert_eq!(draws.n_iterations(), 12);
    assert_eq!(draws.mu.width(), 0);
    assert_eq!(draws.gamma.width(), 0);
}

#[test]
fn more_ranks_than_proteins_still_synchronize() {
    let data = skewed_data(3);
    let ranks = run_parallel(&data, &config(10, true), 5).expect("runs");
    assert_eq!(ranks.len(), 5);
    assert!(ranks.iter().any(|set| set.mu.width() == 0));
    for set in &ranks {
        assert_eq!(set.globals, ranks[0].globals);
    }
}

#[test]
fn censored_state_counts_are_non_negative_and_observed_peptides_keep_a_state() {
    let data = skewed_data(6);
    let partition = partition_for_rank(&data, 1, 0, 2, 0).expect("partition");
    let draws = run_chain(&SoloContext, &partition, &config(20, true)).expect("runs");
    let observed = partition.n_obs_states_per_peptide();
    for iteration in 0..draws.n_iterations() {
        for (peptide, &n_obs) in observed.iter().enumerate() {
            let n_cen = draws.n_cen_states_per_peptide.get(iteration, peptide);
            assert!(usize::try_from(n_cen).unwrap_or(0) + n_obs >= 1);
        }
    }
}
