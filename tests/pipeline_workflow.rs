use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use protein_quant::config::{Config, ConfigError};
use protein_quant::pipeline::{
    calibrate_stage, combine_stage, run_parallel_stage, run_serial_stage, run_worker_stage,
    summarize_stage,
};
use protein_quant::{QuantError, read_draw_set};
use tempfile::TempDir;

const N_PROTEINS: u32 = 6;
const N_ITERATIONS: usize = 40;
const BURN_IN: usize = 10;

fn write_inputs(dir: &Path) {
    let mut states = String::new();
    let mut peptides = String::new();
    let mut peptide = 0;
    for protein in 0..N_PROTEINS {
        for offset in 0..3_u32 {
            writeln!(peptides, "{protein}").expect("format");
            for replicate in 0..=offset {
                let intensity = f64::from(protein).mul_add(0.8, 12.0)
                    + 0.3 * f64::from(offset)
                    + 0.1 * f64::from(replicate);
                writeln!(states, "{peptide}\t{intensity}").expect("format");
            }
            peptide += 1;
        }
    }
    fs::write(dir.join("states.tsv"), states).expect("state file");
    fs::write(dir.join("peptides.tsv"), peptides).expect("peptide file");
    fs::write(dir.join("known.tsv"), "0\t1.0\n3\t5.0\n5\t12.0\n").expect("standards");
    let names: String = (0..N_PROTEINS).map(|p| format!("PROT{p}\n")).collect();
    fs::write(dir.join("proteins.txt"), names).expect("names");
}

fn fixture(synchronize_globals: bool, compress: &str) -> (TempDir, Config) {
    let dir = tempfile::tempdir().expect("temp dir");
    write_inputs(dir.path());
    let path = |name: &str| dir.path().join(name);
    let config = serde_json::json!({
        "data": {
            "path_data_state": path("states.tsv"),
            "path_mapping_peptides": path("peptides.tsv"),
            "path_names_proteins": path("proteins.txt"),
            "path_concentrations": path("known.tsv")
        },
        "output": {
            "path_master": path("out/master.json"),
            "pattern_worker": path("out/worker-{rank}.json"),
            "path_combined": path("out/combined.json"),
            "path_summary": path("out/summary.tsv"),
            "compress": compress,
            "compress_pickle": "gz"
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
            "eta": {"mean": [-2.0, 0.5], "sd": [0.1, 0.05], "cor": 0.0},
            "sigmasq_dist": {"shape": 5.0, "rate": 1.0},
            "tausq_dist": {"shape": 5.0, "rate": 1.0}
        },
        "settings": {
            "burn_in": BURN_IN,
            "n_iterations": N_ITERATIONS,
            "n_strata": 2,
            "seed_load_data": 3,
            "seed": 17,
            "synchronize_globals": synchronize_globals
        }
    });
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, config.to_string()).expect("config file");
    let config = Config::from_path(&config_path).expect("config loads");
    (dir, config)
}

#[test]
fn serial_run_calibrates_and_summarizes() {
    let (_dir, config) = fixture(true, "gzip");
    let draws = run_serial_stage(&config).expect("serial run");
    assert_eq!(draws.n_iterations(), N_ITERATIONS);
    assert_eq!(draws.mu.width(), 6);
    assert_eq!(draws.gamma.width(), 18);

    let calibrated = calibrate_stage(&config).expect("calibrates");
    assert_eq!(calibrated.mu, draws.mu);
    assert_eq!(calibrated.globals, draws.globals);
    let calibration = calibrated.calibration.as_ref().expect("calibration block");
    assert_eq!(calibration.concentration.n_iterations(), N_ITERATIONS);
    assert_eq!(calibration.concentration.width(), 6);
    assert_eq!(read_draw_set(&config.output.path_combined).expect("reads"), calibrated);

    let report = summarize_stage(&config).expect("summarizes");
    assert_eq!(report.n_draws, N_ITERATIONS - BURN_IN);
    assert_eq!(report.proteins.len(), 6);
    assert_eq!(report.proteins[2].name.as_deref(), Some("PROT2"));
    assert!(report.proteins.iter().all(|p| p.concentration.is_some()));
    let text = fs::read_to_string(&config.output.path_summary).expect("summary file");
    assert!(text.starts_with("block\tname\tparameter"));
    assert!(text.contains("PROT5\tconcentration"));
}

#[test]
fn synchronized_ranks_share_globals_and_combine() {
    let (_dir, config) = fixture(true, "none");
    let ranks = run_parallel_stage(&config, 3).expect("parallel run");
    assert_eq!(ranks.len(), 3);
    for set in &ranks[1..] {
        assert_eq!(set.globals, ranks[0].globals);
    }
    for rank in 0..3 {
        assert!(config.output.rank_path(rank).exists());
    }

    let combined = combine_stage(&config, 3).expect("combines");
    assert_eq!(combined.mu.width(), 6);
    assert_eq!(combined.tag.protein_indices, (0..6).collect::<Vec<_>>());
    assert_eq!(combined.globals, ranks[0].globals);
    assert_eq!(combined.acceptance, ranks[0].acceptance);
    for set in &ranks {
        for (local, &protein) in set.tag.protein_indices.iter().enumerate() {
            assert_eq!(combined.mu.column(protein), set.mu.column(local));
        }
    }
}

#[test]
fn detached_workers_combine_with_summed_acceptance() {
    let (_dir, config) = fixture(false, "lzf");
    let ranks: Vec<_> = (0..2)
        .map(|rank| run_worker_stage(&config, rank, 2).expect("worker run"))
        .collect();
    let combined = combine_stage(&config, 2).expect("combines");
    assert!(!combined.synchronized);
    assert_eq!(
        combined.acceptance.eta.proposed,
        ranks[0].acceptance.eta.proposed + ranks[1].acceptance.eta.proposed
    );
    assert_eq!(combined.globals, ranks[0].globals);
}

#[test]
fn detached_worker_requires_independent_globals() {
    let (_dir, config) = fixture(true, "none");
    assert!(matches!(
        run_worker_stage(&config, 0, 2),
        Err(QuantError::Config(ConfigError::SynchronizedWorker))
    ));
}

#[test]
fn missing_rank_file_fails_combination() {
    let (_dir, config) = fixture(false, "none");
    run_worker_stage(&config, 0, 2).expect("worker run");
    assert!(matches!(
        combine_stage(&config, 2),
        Err(QuantError::Storage(_))
    ));
}

#[test]
fn calibration_requires_concentration_table() {
    let (_dir, mut config) = fixture(true, "none");
    config.data.path_concentrations = None;
    run_serial_stage(&config).expect("serial run");
    assert!(matches!(
        calibrate_stage(&config),
        Err(QuantError::Config(ConfigError::MissingConcentrations))
    ));
}

#[test]
fn supervised_run_carries_its_calibration_through_the_pipeline() {
    let (_dir, mut config) = fixture(true, "none");
    config.priors.supervised = true;
    config.priors.concentration_dist = true;
    config.validate().expect("supervised config is valid");
    run_parallel_stage(&config, 2).expect("parallel run");
    let combined = combine_stage(&config, 2).expect("combines");
    let calibration = combined.calibration.as_ref().expect("sampled calibration");
    for iteration in 0..N_ITERATIONS {
        assert_eq!(calibration.concentration.get(iteration, 3), 5.0);
    }

    let unchanged = calibrate_stage(&config).expect("keeps sampled calibration");
    assert_eq!(unchanged, combined);

    let report = summarize_stage(&config).expect("summarizes");
    let names: Vec<&str> = report.globals.iter().map(|(name, _)| *name).collect();
    assert!(names.contains(&"beta1"));
    assert!(names.contains(&"mean_concentration"));
    assert!(report.proteins.iter().all(|p| p.concentration.is_some()));
}
