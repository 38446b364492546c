//! replisync CLI
//!
//! Command-line tools for the replisync sync server.
//!
//! # Commands
//!
//! - `replay` - Run a JSON script of push/pull requests against an in-memory server
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::replay::ReplayOptions;
use replisync_core::GapPolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// replisync command-line tools.
#[derive(Parser)]
#[command(name = "replisync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a script of push/pull requests against an in-memory server
    Replay {
        /// Path to the JSON script
        script: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// How to handle mutation ID gaps
        #[arg(long, value_enum, default_value = "reject")]
        gap_policy: GapArg,

        /// Maximum transaction attempts per request
        #[arg(long, default_value = "10")]
        max_attempts: u32,

        /// Maximum mutations per push
        #[arg(long, default_value = "100")]
        max_push_batch: usize,
    },

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum GapArg {
    /// Reject the whole batch
    Reject,
    /// Skip the rest of the offending client's mutations
    Skip,
}

impl From<GapArg> for GapPolicy {
    fn from(arg: GapArg) -> Self {
        match arg {
            GapArg::Reject => GapPolicy::RejectBatch,
            GapArg::Skip => GapPolicy::SkipClient,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays clean.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            script,
            format,
            gap_policy,
            max_attempts,
            max_push_batch,
        } => {
            let options = ReplayOptions {
                gap_policy: gap_policy.into(),
                max_attempts,
                max_push_batch,
            };
            commands::replay::run(&script, &format, &options)?;
        }
        Commands::Version => {
            println!("replisync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
