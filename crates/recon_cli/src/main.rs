//! Recon CLI
//!
//! Command-line driver for catalog reconciliation.
//!
//! # Commands
//!
//! - `plan` - Show the writes and deletes a diff would produce (dry run)
//! - `apply` - Apply a diff file to a remote catalog
//! - `consume` - Apply reconciliation commands read as JSON lines

mod client;
mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog reconciliation tools.
#[derive(Parser)]
#[command(name = "recon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Write everything one entity at a time, in dependency order
    #[arg(global = true, long)]
    sequential: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the store calls a diff would produce, without a catalog
    Plan {
        /// Diff file with `before` and `after` collections
        diff: PathBuf,

        /// Treat the diff as identity references only
        #[arg(long)]
        refs: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Apply a diff file to a remote catalog
    Apply {
        /// Diff file with `before` and `after` collections
        diff: PathBuf,

        /// Treat the diff as identity references only
        #[arg(long)]
        refs: bool,

        /// Catalog API base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Bearer token for the catalog API
        #[arg(long)]
        token: Option<String>,

        /// Tag the run as user triggered
        #[arg(long)]
        user_triggered: bool,
    },

    /// Apply reconciliation commands read as JSON lines
    Consume {
        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Organization whose topics are consumed
        #[arg(long)]
        org_id: Option<String>,

        /// Catalog API base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Bearer token for the catalog API
        #[arg(long)]
        token: Option<String>,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = config::Settings::load(cli.config.as_deref())?;
    if cli.sequential {
        settings.force_sequential();
    }

    match cli.command {
        Commands::Plan { diff, refs, format } => {
            commands::plan::run(&diff, refs, &format, &settings)?;
        }
        Commands::Apply {
            diff,
            refs,
            base_url,
            token,
            user_triggered,
        } => {
            settings.apply_overrides(base_url, token);
            commands::apply::run(&diff, refs, user_triggered, &settings)?;
        }
        Commands::Consume {
            input,
            org_id,
            base_url,
            token,
        } => {
            settings.apply_overrides(base_url, token);
            if let Some(org_id) = org_id {
                settings.consumer.org_id = Some(org_id);
            }
            commands::consume::run(input.as_deref(), &settings)?;
        }
        Commands::Version => {
            println!("Recon CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
