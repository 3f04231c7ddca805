//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run a host and several clients over a simulated medium
    Demo {
        /// Number of clients joining the host
        #[arg(short = 'n', long, default_value_t = 2)]
        clients: usize,
        /// Ping rounds each client completes
        #[arg(short, long, default_value_t = 3)]
        rounds: u32,
        /// Host loop period in milliseconds
        #[arg(long, default_value_t = 20)]
        tick_ms: u64,
        /// Seed for the simulated medium
        #[arg(long)]
        seed: Option<u64>,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}
