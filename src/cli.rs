//! Shared plumbing of the stage binaries: argument parsing with fixed exit
//! codes, logging setup, per-configuration stage timing.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{Args, Parser};
use log::error;

use crate::config::Config;
use crate::error::QuantError;

/// Unknown option, missing or malformed positional argument.
pub const EXIT_USAGE: u8 = 1;
/// `--help` was requested.
pub const EXIT_HELP: u8 = 2;
/// A stage failed on its data or model.
pub const EXIT_FAILURE: u8 = 3;

/// Arguments every stage binary takes.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Experiment configuration files (JSON), processed in order
    #[arg(required = true, value_name = "CONFIG")]
    pub configs: Vec<PathBuf>,

    /// Report the wall-clock time of each stage on stderr
    #[arg(long)]
    pub time: bool,
}

/// Exit code for a failed parse of the given kind.
#[must_use]
pub const fn usage_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => EXIT_HELP,
        ErrorKind::DisplayVersion => 0,
        _ => EXIT_USAGE,
    }
}

/// Parse the process arguments, exiting with the usage codes on failure.
#[must_use]
pub fn parse_or_exit<P: Parser>() -> P {
    match P::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let code = usage_exit_code(error.kind());
            let _ = error.print();
            std::process::exit(i32::from(code));
        }
    }
}

/// Install the logger; `QUANT_LOG` overrides the default `info` filter.
pub fn init_logging() {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Info)
        .parse_env(env_logger::Env::default().filter_or("QUANT_LOG", "info"))
        .init();
}

struct StageTimer {
    start: Option<Instant>,
}

impl StageTimer {
    fn start(enabled: bool) -> Self {
        Self {
            start: enabled.then(Instant::now),
        }
    }

    fn finish(self, stage: &str, config: &std::path::Path) {
        if let Some(start) = self.start {
            eprintln!(
                "{stage} [{}]: {:.3} s",
                config.display(),
                start.elapsed().as_secs_f64()
            );
        }
    }
}

/// Run `stage` once for every configuration in `args`, in order.
///
/// # Errors
///
/// Stops at the first configuration that cannot be loaded or whose stage
/// fails.
pub fn run_configs<F>(args: &CommonArgs, stage: &str, mut run: F) -> anyhow::Result<()>
where
    F: FnMut(&Config) -> Result<(), QuantError>,
{
    for path in &args.configs {
        let timer = StageTimer::start(args.time);
        let config = Config::from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?;
        run(&config).with_context(|| format!("{stage} stage for {}", path.display()))?;
        timer.finish(stage, path);
    }
    Ok(())
}

/// Map a driver result to the process exit code, logging the error chain.
#[must_use]
pub fn finish(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!("{failure:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
