use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use mergeq::config::Config;
use mergeq::core::runner;
use mergeq::logging::{LogConfig, init_logging};
use mergeq::server;

/// An autonomous merge-queue controller for GitHub pull requests.
#[derive(Debug, Parser)]
#[command(name = "mergeq", version = mergeq::VERSION, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run as a web server and process on each GET trigger.
    #[arg(long)]
    server: bool,

    /// Override the configured dry-run mode.
    #[arg(long, value_name = "BOOL")]
    dry_run: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = args
        .config
        .or_else(default_config_path)
        .context("no configuration file found (use --config)")?;

    let mut config = Config::load(&config_path)?;
    if let Some(dry_run) = args.dry_run {
        config.extra.dry_run = dry_run;
    }

    let _log_guard = init_logging(LogConfig::from_extra(&config.extra));
    tracing::info!(
        version = mergeq::VERSION,
        build = mergeq::GIT_HASH,
        config = %config_path.display(),
        "starting mergeq"
    );

    if config.extra.dry_run {
        tracing::warn!(
            "IMPORTANT: dry-run mode is enabled, use `--dry-run false` to disable it"
        );
    }

    if args.server {
        server::serve(config).await
    } else {
        runner::run_once(&config).await
    }
}

/// The first configuration file that exists among the default locations.
fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("mergeq.toml");
    if local.is_file() {
        return Some(local);
    }
    Config::default_path().filter(|path| path.is_file())
}
