//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// filedex - background filesystem indexing daemon
#[derive(Debug, Parser)]
#[command(name = "filedex")]
#[command(version = VERSION)]
#[command(about = "Create and maintain a searchable index of chosen directories", long_about = None)]
pub struct Cli {
    /// Working directory holding the catalog databases
    /// (defaults to the executable's directory)
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Append logs to this file instead of stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level tokens joined by '|':
    /// off, fatal, error, warn, info, debug, trace, all
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// TCP port for the RPC server
    #[arg(long, default_value_t = 9000)]
    pub port: u16,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print version information
    Version,
}

/// Handle subcommands. Returns true if one was handled (exit after).
pub fn handle_subcommand(cli: &Cli) -> bool {
    match cli.command {
        Some(Commands::Version) => {
            println!(
                "filedex {} compiled with rustc (edition 2021) on {}/{}",
                VERSION,
                std::env::consts::OS,
                std::env::consts::ARCH
            );
            true
        }
        None => false,
    }
}
