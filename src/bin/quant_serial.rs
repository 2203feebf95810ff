//! Run the full model as one rank and write the combined draw set.

use std::process::ExitCode;

use clap::Parser;
use protein_quant::cli::{CommonArgs, finish, init_logging, parse_or_exit, run_configs};
use protein_quant::pipeline::run_serial_stage;

#[derive(Debug, Parser)]
#[command(name = "quant-serial", version, about = "Serial MCMC for absolute protein quantitation")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli: Cli = parse_or_exit();
    init_logging();
    finish(run_configs(&cli.common, "serial", |config| {
        run_serial_stage(config).map(|_| ())
    }))
}
