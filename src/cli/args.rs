//! CLI argument definitions using clap
//!
//! Commands:
//! - graphgate check-config --config <path>
//! - graphgate run --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// graphgate - write-path admission gate for a sharded graph store
#[derive(Parser, Debug)]
#[command(name = "graphgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a cluster configuration and print the resolved settings
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./graphgate.json")]
        config: PathBuf,
    },

    /// Start an in-process cluster and serve JSON requests from stdin
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./graphgate.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
