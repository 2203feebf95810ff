//! Run every rank of a partitioned chain in this process and write one draw
//! set per rank.

use std::process::ExitCode;

use clap::Parser;
use protein_quant::cli::{CommonArgs, finish, init_logging, parse_or_exit, run_configs};
use protein_quant::pipeline::run_parallel_stage;

#[derive(Debug, Parser)]
#[command(name = "quant-parallel", version, about = "Distributed MCMC over in-process ranks")]
struct Cli {
    /// Number of ranks, master included
    n_workers: usize,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli: Cli = parse_or_exit();
    init_logging();
    finish(run_configs(&cli.common, "parallel", |config| {
        run_parallel_stage(config, cli.n_workers).map(|_| ())
    }))
}
