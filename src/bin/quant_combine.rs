//! Combine per-rank draw sets into one.

use std::process::ExitCode;

use clap::Parser;
use protein_quant::cli::{CommonArgs, finish, init_logging, parse_or_exit, run_configs};
use protein_quant::pipeline::combine_stage;

#[derive(Debug, Parser)]
#[command(name = "quant-combine", version, about = "Combine per-rank draw sets")]
struct Cli {
    /// Number of ranks that produced draw sets
    n_workers: usize,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli: Cli = parse_or_exit();
    init_logging();
    finish(run_configs(&cli.common, "combine", |config| {
        combine_stage(config, cli.n_workers).map(|_| ())
    }))
}
