//! Summarize combined draws and print the tables.

use std::process::ExitCode;

use clap::Parser;
use protein_quant::cli::{CommonArgs, finish, init_logging, parse_or_exit, run_configs};
use protein_quant::pipeline::summarize_stage;
use protein_quant::summary::render_tables;

#[derive(Debug, Parser)]
#[command(name = "quant-summarize", version, about = "Posterior summaries after burn-in")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Only write the summary file, without printing tables
    #[arg(long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli: Cli = parse_or_exit();
    init_logging();
    finish(run_configs(&cli.common, "summarize", |config| {
        let report = summarize_stage(config)?;
        if !cli.quiet {
            for table in render_tables(&report) {
                println!("{table}");
            }
        }
        Ok(())
    }))
}
