use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sqlsage",
    version,
    about = "Answers natural-language questions over a BigQuery dataset"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Turn one or more questions into SQL, run it and narrate the result
    Ask(AskArgs),
    /// Estimate a query against the warehouse without running it
    DryRun(DryRunArgs),
    /// Write a sample sqlsage.yaml
    Init(InitArgs),
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Clone)]
pub struct AskArgs {
    #[arg(long, default_value = "sqlsage.yaml")]
    pub config: PathBuf,

    /// Repeat to answer several questions concurrently
    #[arg(long = "question", short = 'q', required = true)]
    pub questions: Vec<String>,

    #[arg(long, default_value_t = 4)]
    pub parallel: usize,

    /// Override debugging.rounds
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Skip the model validator; only the dry run gates the SQL
    #[arg(long)]
    pub no_validation: bool,

    /// Skip exact-match lookup and example retrieval
    #[arg(long)]
    pub no_examples: bool,

    /// Fail on unknown config keys
    #[arg(long)]
    pub strict: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Clone)]
pub struct DryRunArgs {
    #[arg(long, default_value = "sqlsage.yaml")]
    pub config: PathBuf,

    #[arg(long)]
    pub sql: String,

    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "sqlsage.yaml")]
    pub config: PathBuf,
}
