//! # Crash Digest CLI (`crashd`)
//!
//! ## Usage
//!
//! ```bash
//! crashd --config ./config/crashd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crashd run` | Fetch, filter, render and publish all reports |
//! | `crashd parse <file>` | Parse one local report and print it as JSON |
//! | `crashd days` | List cached days with file counts and sizes |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crash_digest::config::{self, PolicyConfig, SymbolsConfig};
use crash_digest::progress::ProgressMode;
use crash_digest::publish::{StoreUploader, Uploader};
use crash_digest::{days, inspect, logging, pipeline, store};

/// Crash Digest: turn uploaded crash reports into a browsable daily report.
#[derive(Parser)]
#[command(
    name = "crashd",
    about = "Crash Digest: ingest, symbolicate, filter and publish uploaded crash reports",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crashd.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline.
    ///
    /// Lists every report under the configured prefix, deletes outdated and
    /// denylisted ones, downloads the rest into the local cache, renders the
    /// site into `paths.html_dir` and publishes it.
    Run {
        /// Render the site but do not upload it.
        #[arg(long)]
        no_publish: bool,

        /// Progress output on stderr: `auto`, `human`, `json`, or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Parse a single report file and print the structured result as JSON.
    ///
    /// Works without a config file; policy and link settings then use
    /// their defaults. A config file that exists must be valid.
    Parse {
        /// Path to a `.txt` crash report.
        file: PathBuf,
    },

    /// List the days present in the local report cache.
    Days,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Commands that don't require config
    if let Commands::Parse { file } = &cli.command {
        let (policy, symbols) = if cli.config.exists() {
            let cfg = config::load_config(&cli.config)?;
            (cfg.policy, cfg.symbols)
        } else {
            (PolicyConfig::default(), SymbolsConfig::default())
        };
        return inspect::run_parse(file, &policy, &symbols);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            no_publish,
            progress,
        } => {
            let reporter = ProgressMode::from_flag(&progress)?.reporter();
            let store = store::create_store(&cfg.store)?;
            let uploader = (cfg.publish.enabled && !no_publish)
                .then(|| StoreUploader::new(store.clone(), &cfg.publish));

            let summary = pipeline::run(
                &cfg,
                store,
                uploader.as_ref().map(|u| u as &dyn Uploader),
                reporter.as_ref(),
                chrono::Utc::now(),
            )
            .await?;
            pipeline::print_summary(&summary);
        }
        Commands::Days => {
            days::run_days(&cfg)?;
        }
        Commands::Parse { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
