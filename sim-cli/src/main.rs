//! Device Script Simulator
//!
//! A command line shell for managing device script project packages and
//! running them on the simulated device.

mod cli;
mod commands;
mod settings;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::Cli;
use settings::Settings;

const LOG_TARGETS: [&str; 4] = ["scriptsim", "sim_package", "sim_runtime", "sim_control"];

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(commands::dispatch(cli.command, &settings))
}

/// Install the tracing subscriber
///
/// RUST_LOG wins unless a verbosity flag was given.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let directives = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",");

    let filter = if quiet || verbose > 0 {
        EnvFilter::new(directives)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| directives.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
