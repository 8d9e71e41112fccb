//! Runtime configuration resolved from the command line.
//!
//! Bad values fail fast here, before any database is opened or task
//! spawned.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::cli::Cli;

/// Database file names inside the working directory.
pub const FILES_DB: &str = "files.db";
pub const WATCHED_DIRS_DB: &str = "watched_dirs.db";

/// Effective log verbosity after resolving the `--log-level` tokens.
/// `fatal` collapses into `Error` and `all` into `Trace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse a `|`-joined token list; the most verbose token wins.
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let mut level = None;
        for token in spec.split('|') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let parsed = match token.to_ascii_lowercase().as_str() {
                "off" => LogLevel::Off,
                "fatal" | "error" => LogLevel::Error,
                "warn" => LogLevel::Warn,
                "info" => LogLevel::Info,
                "debug" => LogLevel::Debug,
                "trace" | "all" => LogLevel::Trace,
                other => bail!("unrecognized log level {other:?}"),
            };
            level = Some(level.map_or(parsed, |current: LogLevel| current.max(parsed)));
        }
        level.ok_or_else(|| anyhow::anyhow!("empty log level"))
    }

    /// The corresponding tracing filter directive.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub workdir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub log_level: LogLevel,
    pub port: u16,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let workdir = match &cli.workdir {
            Some(dir) => dir.clone(),
            None => default_workdir()?,
        };
        let meta = std::fs::metadata(&workdir)
            .with_context(|| format!("workdir {} is not accessible", workdir.display()))?;
        if !meta.is_dir() {
            bail!("workdir {} is not a directory", workdir.display());
        }

        Ok(Self {
            workdir,
            log_file: cli.log_file.clone(),
            log_level: LogLevel::parse_spec(&cli.log_level)?,
            port: cli.port,
        })
    }

    pub fn files_db(&self) -> PathBuf {
        self.workdir.join(FILES_DB)
    }

    pub fn watched_db(&self) -> PathBuf {
        self.workdir.join(WATCHED_DIRS_DB)
    }
}

fn default_workdir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating the executable")?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("filedex").chain(args.iter().copied()))
    }

    #[test]
    fn single_tokens_parse() {
        assert_eq!(LogLevel::parse_spec("off").unwrap(), LogLevel::Off);
        assert_eq!(LogLevel::parse_spec("fatal").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::parse_spec("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::parse_spec("warn").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::parse_spec("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::parse_spec("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::parse_spec("trace").unwrap(), LogLevel::Trace);
        assert_eq!(LogLevel::parse_spec("all").unwrap(), LogLevel::Trace);
    }

    #[test]
    fn most_verbose_token_wins() {
        assert_eq!(
            LogLevel::parse_spec("error|debug|warn").unwrap(),
            LogLevel::Debug
        );
        assert_eq!(LogLevel::parse_spec("off|info").unwrap(), LogLevel::Info);
    }

    #[test]
    fn tokens_are_case_insensitive_and_trimmed() {
        assert_eq!(
            LogLevel::parse_spec(" INFO | Debug ").unwrap(),
            LogLevel::Debug
        );
    }

    #[test]
    fn unknown_token_is_an_error() {
        assert!(LogLevel::parse_spec("verbose").is_err());
        assert!(LogLevel::parse_spec("info|louder").is_err());
    }

    #[test]
    fn empty_spec_is_an_error() {
        assert!(LogLevel::parse_spec("").is_err());
        assert!(LogLevel::parse_spec(" | ").is_err());
    }

    #[test]
    fn workdir_must_exist() {
        let result = Config::from_cli(&cli(&["--workdir", "/nonexistent/filedex-test"]));
        assert!(result.is_err());
    }

    #[test]
    fn workdir_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        let result = Config::from_cli(&cli(&["--workdir", &file.to_string_lossy()]));
        assert!(result.is_err());
    }

    #[test]
    fn flags_resolve_into_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_cli(&cli(&[
            "--workdir",
            &dir.path().to_string_lossy(),
            "--log-level",
            "debug",
            "--port",
            "9010",
        ]))
        .unwrap();

        assert_eq!(config.port, 9010);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.files_db(), dir.path().join("files.db"));
        assert_eq!(config.watched_db(), dir.path().join("watched_dirs.db"));
    }

    #[test]
    fn port_defaults_to_9000() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            Config::from_cli(&cli(&["--workdir", &dir.path().to_string_lossy()])).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_level, LogLevel::Info);
    }
}
