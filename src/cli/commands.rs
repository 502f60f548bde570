//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - eval: score a recorded dataset and persist the run
//! - show: print a stored run
//! - runs: list stored runs
//! - config: print the effective configuration

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// evalloop - bounded-concurrency evaluation and iteration control
#[derive(Parser, Debug)]
#[command(name = "evalloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score a JSONL dataset of recorded outputs
    Eval(EvalArgs),

    /// Show a stored evaluation run
    Show {
        /// Run ID to show
        run_id: String,

        /// Print every case result, not just the summary
        #[arg(short, long)]
        detailed: bool,
    },

    /// List stored evaluation runs
    Runs,

    /// Print the effective configuration as YAML
    Config,
}

/// Arguments for `eval`
#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    /// JSONL file, one case per line
    pub dataset: PathBuf,

    /// Dataset ID (defaults to the file stem)
    #[arg(long)]
    pub dataset_id: Option<String>,

    /// Maximum in-flight cases
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Number of passes over the dataset
    #[arg(short, long)]
    pub repeat: Option<usize>,

    /// Scorer key to run (repeatable; defaults to the configured scorers)
    #[arg(short, long = "scorer")]
    pub scorers: Vec<String>,

    /// Compare answers ignoring case
    #[arg(long)]
    pub case_insensitive: bool,
}

impl EvalArgs {
    /// Dataset ID from the flag or the file stem.
    pub fn resolved_dataset_id(&self) -> String {
        self.dataset_id.clone().unwrap_or_else(|| {
            self.dataset
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dataset".to_string())
        })
    }
}
