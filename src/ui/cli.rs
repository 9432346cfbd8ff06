//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// trailscan: pulls a detection rule from a central repository and scans
/// this endpoint's disk or process memory, reporting matches back
#[derive(Parser, Debug)]
#[command(name = "trailscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan files under a directory against a named rule
    DiskScan {
        /// Directory to scan recursively
        path: PathBuf,

        /// Rule repository server address
        server: String,

        /// Name of the rule to fetch and apply
        rule: String,

        /// Suppress per-item output
        #[arg(short, long)]
        silent: bool,
    },

    /// Scan running processes' memory against a named rule
    MemScan {
        /// Rule repository server address
        server: String,

        /// Name of the rule to fetch and apply
        rule: String,

        /// Suppress per-item output
        #[arg(short, long)]
        silent: bool,
    },
}
