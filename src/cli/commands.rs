//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solidafy bulk export CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-bulk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Stream definition file (YAML)
    #[arg(short, long, global = true)]
    pub definition: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Inline config JSON, takes precedence over --config
    #[arg(long, global = true)]
    pub config_json: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bulk export and print one record per line
    Read {
        /// Test read: one attempt per job and at most N slices (default 5)
        #[arg(long, num_args = 0..=1, default_missing_value = "5", value_name = "N")]
        test_read: Option<usize>,

        /// Seconds between two polls of the running jobs
        #[arg(long, value_name = "S")]
        polling_interval_secs: Option<u64>,
    },

    /// Validate the stream definition
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
