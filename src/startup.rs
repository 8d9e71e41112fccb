//! Startup banner printed before the tracing subscriber takes over.

use crate::cli::VERSION;
use crate::config::Config;

pub fn print_banner(config: &Config) {
    println!("Welcome to filedex v{VERSION}!");
    println!("  workdir: {}", config.workdir.display());
    println!("  rpc:     0.0.0.0:{}", config.port);
    if let Some(log_file) = &config.log_file {
        println!("  logs:    {}", log_file.display());
    }
    println!();
}
