//! Calibrate combined draws against proteins of known concentration.

use std::process::ExitCode;

use clap::Parser;
use protein_quant::cli::{CommonArgs, finish, init_logging, parse_or_exit, run_configs};
use protein_quant::pipeline::calibrate_stage;

#[derive(Debug, Parser)]
#[command(name = "quant-calibrate", version, about = "Per-draw concentration calibration")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli: Cli = parse_or_exit();
    init_logging();
    finish(run_configs(&cli.common, "calibrate", |config| {
        calibrate_stage(config).map(|_| ())
    }))
}
