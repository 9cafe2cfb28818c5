mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// photopoints: turn geotagged photos into per-group point feature stores
#[derive(Parser)]
#[command(name = "photopoints", version, about)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a directory of JPG photos into one store per group value
    Import(ImportArgs),
    /// Print the schema and rows of a store
    Inspect {
        /// Path to the store file
        path: PathBuf,
    },
}

#[derive(clap::Args)]
pub struct ImportArgs {
    /// TOML file with import settings; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the photos
    #[arg(long)]
    input: Option<PathBuf>,

    /// Root directory for the stores
    #[arg(long)]
    output: Option<PathBuf>,

    /// Description key whose value selects the store
    #[arg(long)]
    key: Option<String>,

    /// Permitted group value (repeatable)
    #[arg(long = "allow")]
    allow: Vec<String>,

    /// Keep rows for photos missing from this batch
    #[arg(long)]
    no_prune: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for directive in [format!("photopoints={level}"), format!("photopoints_core={level}")] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Import(args) => {
            let report = commands::import::run(args)?;
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Commands::Inspect { path } => commands::inspect::run(&path)?,
    }

    Ok(())
}
