//! # Policy Link CLI (`pplink`)
//!
//! ## Usage
//!
//! ```bash
//! pplink --config ./config/pplink.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pplink init` | Create the SQLite database and the result table |
//! | `pplink run` | Resolve the privacy-policy link of every crawled form |
//! | `pplink stats` | Show per-scope result counts |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use policy_link::progress::ProgressMode;
use policy_link::run_cmd::{self, RunArgs};
use policy_link::{config, migrate, stats};

/// Policy Link: finds the privacy-policy link governing each crawled web
/// form.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pplink.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pplink",
    about = "Resolve the privacy-policy link of every web form in a crawl",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pplink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the result table. Running it
    /// more than once is safe.
    Init,

    /// Resolve every form of every (selected) domain and store the results.
    Run {
        /// Only resolve this domain. Repeatable.
        #[arg(long = "domain")]
        domains: Vec<String>,

        /// Resolve at most this many domains.
        #[arg(long)]
        limit: Option<usize>,

        /// Delete all previous results first.
        #[arg(long)]
        fresh: bool,

        /// Resolve without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Override `workers.domain_workers`.
        #[arg(long)]
        domain_workers: Option<usize>,

        /// Override `workers.scoring_workers`.
        #[arg(long)]
        scoring_workers: Option<usize>,

        /// Override `resolve.threshold`.
        #[arg(long)]
        threshold: Option<f32>,

        /// Progress on stderr: human, json or off. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Show result counts per scope.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            domains,
            limit,
            fresh,
            dry_run,
            domain_workers,
            scoring_workers,
            threshold,
            progress,
        } => {
            let args = RunArgs {
                domains,
                limit,
                fresh,
                dry_run,
                domain_workers,
                scoring_workers,
                threshold,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            run_cmd::run_resolve(&cfg, args).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
