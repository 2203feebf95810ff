//! Run one detached rank with its own global chain.

use std::process::ExitCode;

use clap::Parser;
use protein_quant::cli::{CommonArgs, finish, init_logging, parse_or_exit, run_configs};
use protein_quant::pipeline::run_worker_stage;

#[derive(Debug, Parser)]
#[command(
    name = "quant-worker",
    version,
    about = "One rank of a run with independent global parameters"
)]
struct Cli {
    /// Rank of this process, 0 for the master
    rank: usize,

    /// Total number of ranks
    n_workers: usize,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli: Cli = parse_or_exit();
    init_logging();
    finish(run_configs(&cli.common, "worker", |config| {
        run_worker_stage(config, cli.rank, cli.n_workers).map(|_| ())
    }))
}
