use super::args::*;
use sqlsage_core::config::{load_config, write_sample_config, SageConfig};
use sqlsage_core::errors::ConfigError;
use std::path::Path;

pub mod ask;
pub mod dry_run;

pub mod exit_codes {
    pub const OK: i32 = 0;
    /// At least one answer still failed validation after every repair round.
    pub const INVALID_SQL: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const RUN_FAILED: i32 = 3;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Ask(args) => ask::run(args).await,
        Command::DryRun(args) => dry_run::run(args).await,
        Command::Init(args) => cmd_init(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    write_sample_config_if_missing(&args.config)?;
    Ok(exit_codes::OK)
}

fn write_sample_config_if_missing(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        eprintln!("note: {} already exists", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_sample_config(path)?;
    eprintln!("created {}", path.display());
    Ok(())
}

/// Loads the config, printing the reason and returning the exit code on failure.
pub(crate) fn load_or_exit(path: &Path, strict: bool) -> Result<SageConfig, i32> {
    load_config(path, strict).map_err(|e| config_error(&e))
}

pub(crate) fn config_error(e: &ConfigError) -> i32 {
    tracing::error!(event = "config_error", error = %e);
    eprintln!("{}", e);
    exit_codes::CONFIG_ERROR
}
