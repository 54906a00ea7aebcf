//! Refresh derived data in the geocoding database.
//!
//! Rebuilds the address level table, imports wikipedia importance
//! dumps and recomputes place importance.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cypress_refresh::db;
use cypress_refresh::importance::WikipediaArticleScorer;
use cypress_refresh::{
    import_wikipedia_articles, load_address_levels_from_config, ErrorPolicy, ImportanceRecomputer,
    Settings, SwapOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "refresh")]
#[command(about = "Bring auxiliary data in the geocoding database up to date")]
struct Args {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file (overrides the settings file)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Directory with the wikimedia importance dump (overrides the settings file)
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Rebuild the address level table from its configuration
    #[arg(long)]
    address_levels: bool,

    /// Import the wikipedia importance dump
    #[arg(long)]
    wiki_data: bool,

    /// Recompute importance of all places
    #[arg(long)]
    importance: bool,

    /// Log and continue when the importance dump fails to load
    #[arg(long)]
    ignore_errors: bool,

    /// Show a progress bar during importance recomputation
    #[arg(long)]
    progress: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let mut settings = match &args.config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(path) = args.database {
        settings.database.path = path;
    }
    if let Some(path) = args.data_path {
        settings.refresh.data_path = path;
    }

    if !(args.address_levels || args.wiki_data || args.importance) {
        info!("Nothing to do. Use --address-levels, --wiki-data or --importance.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut conn = db::open(&settings.database.path).context("Failed to open database")?;

    if args.address_levels {
        info!("Updating address levels");
        let rows = load_address_levels_from_config(&mut conn, &settings)
            .context("Failed to load address levels")?;
        info!("Address levels updated ({} rows)", rows);
    }

    if args.wiki_data {
        let policy = if args.ignore_errors {
            ErrorPolicy::IgnoreAndLog
        } else {
            ErrorPolicy::Propagate
        };
        let outcome = import_wikipedia_articles(&mut conn, &settings.refresh.data_path, policy)
            .context("Failed to import wikipedia importance data")?;

        if outcome == SwapOutcome::Skipped {
            error!(
                "FATAL: Wikipedia importance dump file not found in {}",
                settings.refresh.data_path.display()
            );
            return Ok(ExitCode::from(outcome.exit_code() as u8));
        }
    }

    if args.importance {
        let progress = if args.progress {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
                    )?
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let scorer = WikipediaArticleScorer::for_connection(&conn)?;
        let stats = ImportanceRecomputer::from_config(&settings.refresh)
            .with_progress(progress)
            .run(&mut conn, &scorer)
            .context("Failed to recompute importance")?;
        info!(
            "Importance updated for {} places ({} from linked places)",
            stats.rescored, stats.propagated
        );
    }

    Ok(ExitCode::SUCCESS)
}
