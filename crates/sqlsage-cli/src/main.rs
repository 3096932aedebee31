use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::args::Cli;
use cli::commands::{dispatch, exit_codes};

fn init_logging() {
    let level = std::env::var("SQLSAGE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries answers; logs go to stderr
    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(event = "fatal", error = %e);
            eprintln!("fatal: {e:?}");
            match sqlsage_core::errors::try_map_error(&e) {
                Some(_) => exit_codes::CONFIG_ERROR,
                None => exit_codes::RUN_FAILED,
            }
        }
    };
    std::process::exit(code);
}
