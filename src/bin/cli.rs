//! railcodes CLI
//!
//! Collects railway codes tables live or from saved snapshots.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use railcodes::{
    error::Result,
    models::{Config, Initial, Layout, Scope},
    pipeline,
    services::{CategoryResolver, CodeRepository, ConnectivityGate, FixedGate, HttpProbe},
    storage::{LocalSnapshotStore, SnapshotStore},
    utils::http::HttpFetcher,
};

/// railcodes - Railway Codes Collector
#[derive(Parser, Debug)]
#[command(
    name = "railcodes",
    version,
    about = "Collect railway codes tables, live or from offline snapshots"
)]
struct Cli {
    /// Directory holding config.toml; relative snapshot paths resolve against it
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect a category and print it as JSON
    Collect {
        category: String,

        /// Only the page of this initial letter
        #[arg(short, long)]
        initial: Option<Initial>,

        /// Skip the network and serve the saved snapshot
        #[arg(long)]
        offline: bool,

        /// Save a live result as the snapshot
        #[arg(long)]
        save: bool,
    },

    /// Refresh saved snapshots from the live site
    Update {
        /// Category to update (default: all)
        category: Option<String>,

        /// Update even if the snapshot is still fresh
        #[arg(long)]
        force: bool,
    },

    /// Print a saved snapshot without touching the network
    Load {
        category: String,

        #[arg(short, long)]
        initial: Option<Initial>,
    },

    /// Print the mileage file of an ELR as JSON
    Mileage {
        elr: String,

        /// Skip the network and serve the saved copy
        #[arg(long)]
        offline: bool,

        /// Save a live mileage file
        #[arg(long)]
        save: bool,
    },

    /// Find where two ELRs meet
    Connect {
        start: String,
        end: String,

        #[arg(long)]
        offline: bool,
    },

    /// List the initial pages linked from a category's index page
    Catalogue { category: String },

    /// List configured categories
    Categories,

    /// Validate configuration
    Validate,

    /// Show saved snapshot info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn scope(initial: Option<Initial>) -> Scope {
    initial.map_or(Scope::All, Scope::Initial)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Main entry point for the CLI application.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.data_dir.join("config.toml");
    let mut config = Config::load_or_default(&config_path);
    config.storage.snapshot_dir = cli.data_dir.join(&config.storage.snapshot_dir);

    log::debug!("Loaded configuration from {}", config_path.display());

    let store = LocalSnapshotStore::from_config(&config.storage);
    let fetcher = HttpFetcher::new(&config.http)?;
    let offline = matches!(
        cli.command,
        Command::Collect { offline: true, .. }
            | Command::Mileage { offline: true, .. }
            | Command::Connect { offline: true, .. }
            | Command::Load { .. }
    );
    let gate: Box<dyn ConnectivityGate> = if offline {
        Box::new(FixedGate(false))
    } else {
        Box::new(HttpProbe::new(&config.http))
    };
    let resolver = CategoryResolver::new(&fetcher, &config)?;
    let repository = CodeRepository::new(resolver, gate.as_ref(), &store, &config.categories);

    match cli.command {
        Command::Collect {
            category,
            initial,
            offline: _,
            save,
        } => {
            let triad = pipeline::run_collect(&repository, &category, scope(initial), save)?;
            print_json(&triad)?;
        }

        Command::Update { category, force } => {
            let reports = pipeline::run_update(&repository, category.as_deref(), force)?;
            print_json(&reports)?;
        }

        Command::Load { category, initial } => {
            let spec = repository.category(&category)?;
            let response = repository.load(&category, scope(initial))?;
            print_json(&response.to_triad(spec))?;
        }

        Command::Mileage { elr, save, .. } => {
            let file = pipeline::run_mileage(&repository, &elr, save)?;
            print_json(&file)?;
        }

        Command::Connect { start, end, .. } => {
            let connection = pipeline::run_connect(&repository, &start, &end)?;
            print_json(&connection)?;
        }

        Command::Catalogue { category } => {
            let spec = repository.category(&category)?;
            let catalogue = repository.resolver().catalogue(spec)?;
            log::info!("{}: {} initial pages", spec.name, catalogue.len());
            print_json(&catalogue)?;
        }

        Command::Categories => {
            for spec in &config.categories {
                let layout = match &spec.layout {
                    Layout::Paginated { .. } => "by initial",
                    Layout::SinglePage { .. } => "single page",
                    Layout::Sections { .. } => "sections",
                    Layout::LinkIndex { .. } => "link index",
                };
                println!("{:<34} {:<40} {}", spec.id, spec.name, layout);
            }
        }

        Command::Validate => {
            pipeline::run_validate(&config)?;
            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Data directory: {}", cli.data_dir.display());
            log::info!(
                "Config: {}",
                if config_path.exists() {
                    "config.toml"
                } else {
                    "built-in defaults"
                }
            );
            log::info!("Snapshots: {}", store.root().display());

            for spec in &config.categories {
                let keys = store.keys(&spec.id)?;
                if keys.is_empty() {
                    log::info!("  {}: no snapshot", spec.id);
                    continue;
                }
                for key in keys {
                    match store.load(&key) {
                        Ok(Some(snapshot)) => log::info!(
                            "  {}: {} records, saved {}{}",
                            key,
                            snapshot.table.len(),
                            snapshot.saved_at.format("%Y-%m-%d %H:%M"),
                            if store.is_stale(&key) { " (stale)" } else { "" }
                        ),
                        Ok(None) => {}
                        Err(e) => log::warn!("  {}: unreadable ({})", key, e),
                    }
                }
            }
        }
    }

    Ok(())
}
