//! VerDB CLI
//!
//! Command-line tools for exercising the VerDB transaction engine against an
//! in-memory store.
//!
//! # Commands
//!
//! - `run` - Run a JSON bundle as one transaction
//! - `inspect` - Display the version table of a seed file
//! - `index` - Show the search index actions for a seed file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// VerDB command-line tools.
#[derive(Parser)]
#[command(name = "verdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file holding the stored versions to start from
    #[arg(global = true, short, long)]
    seed: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON bundle as one transaction
    Run {
        /// JSON file holding the bundle entries
        #[arg(short, long)]
        bundle: PathBuf,

        /// Execution budget in milliseconds
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display the version table
    Inspect {
        /// Only show versions of this logical id
        #[arg(short, long)]
        id: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the search index actions for every stored version
    Index {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            bundle,
            budget_ms,
            format,
        } => {
            let output = commands::run::run(cli.seed.as_deref(), &bundle, budget_ms, &format)?;
            print!("{output}");
        }
        Commands::Inspect { id, format } => {
            let seed = cli.seed.ok_or("Seed file required for inspect")?;
            print!("{}", commands::inspect::run(&seed, id.as_deref(), &format)?);
        }
        Commands::Index { format } => {
            let seed = cli.seed.ok_or("Seed file required for index")?;
            print!("{}", commands::index::run(&seed, &format)?);
        }
        Commands::Version => {
            println!("VerDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("VerDB Core v{}", verdb_core::VERSION);
        }
    }

    Ok(())
}
