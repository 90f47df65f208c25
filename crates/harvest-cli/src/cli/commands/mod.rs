//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod batches;
mod helpers;
mod run;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use harvest::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Resumable, rate-adaptive harvesting of paginated search results")]
#[command(version)]
pub struct Cli {
    /// Data directory for checkpoints and batches (overrides config file)
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest one job per query, resuming from any checkpoint
    Run {
        /// Search category
        #[arg(long, default_value = "")]
        category: String,
        /// Search queries (repeat for concurrent jobs)
        #[arg(short, long = "query", required = true)]
        queries: Vec<String>,
        /// Cap on pages per job (defaults to engine.max_pages)
        #[arg(long)]
        max_pages: Option<u32>,
        /// First follow-up page to fetch on a fresh job
        #[arg(long)]
        start_page: Option<u32>,
        /// Wall-clock budget per invocation, in seconds
        #[arg(long)]
        budget: Option<u64>,
        /// Retry pages that failed on an earlier run
        #[arg(long)]
        retry_failed: bool,
        /// Also store every raw page
        #[arg(long)]
        archive: bool,
        /// Hide progress bars
        #[arg(long)]
        quiet: bool,
    },

    /// Show the checkpoint of a job
    Status {
        #[arg(long, default_value = "")]
        category: String,
        #[arg(short, long)]
        query: String,
        /// Output the raw checkpoint as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the flushed batches of a job
    Batches {
        #[arg(long, default_value = "")]
        category: String,
        #[arg(short, long)]
        query: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data: cli.data,
    };
    let (settings, config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Run {
            category,
            queries,
            max_pages,
            start_page,
            budget,
            retry_failed,
            archive,
            quiet,
        } => {
            let options = run::RunOptions {
                category,
                queries,
                max_pages,
                start_page,
                budget,
                retry_failed,
                archive,
                quiet,
            };
            run::cmd_run(&settings, &config, options).await
        }
        Commands::Status {
            category,
            query,
            json,
        } => status::cmd_status(&settings, &category, &query, json).await,
        Commands::Batches { category, query } => {
            batches::cmd_batches(&settings, &category, &query).await
        }
    }
}
