mod cli;

use anyhow::Result;
use clap::Parser; // needed for Cli::parse()
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::commands::run_cli;
use cli::opts::Cli;

fn main() -> ExitCode {
    let args = Cli::parse();
    init_logger(args.log_level);
    debug!("log level set to {}", args.log_level);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<()> {
    debug!("{args:?}");
    run_cli(args)
}

/// `RUST_LOG` wins when set; otherwise `level` applies to this workspace's crates only.
fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => EnvFilter::from_default_env(),
        None => EnvFilter::new(format!(
            "{}={level},financepro_core={level},financepro_json={level}",
            env!("CARGO_CRATE_NAME"),
        )),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
