// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `cmdpool`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cmdpool",
    version,
    about = "Run several commands concurrently and watch their output.",
    long_about = None
)]
pub struct CliArgs {
    /// Commands to run, one per argument (quote each command line).
    #[arg(value_name = "COMMAND")]
    pub commands: Vec<String>,

    /// Command to run; may be repeated. Takes precedence over positional
    /// commands and the config file.
    #[arg(short = 'e', long = "command", value_name = "CMD")]
    pub command: Vec<String>,

    /// Path to a config file (TOML) with command sets.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run only this command set from the config file.
    #[arg(short, long, value_name = "NAME", requires = "config")]
    pub set: Option<String>,

    /// Working directory for commands given on the command line.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Relaunch command-line commands that exit with a failure.
    #[arg(long)]
    pub auto_restart: bool,

    /// Lines of output kept per command. Overrides the config file.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_output_lines: Option<u64>,

    /// Monitor refresh interval in milliseconds. Overrides the config file.
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_ms: Option<u64>,

    /// Most lines printed per command per refresh.
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub tail: usize,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CMDPOOL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Do not read control commands (stop, restart, add, quit) from stdin.
    #[arg(long)]
    pub no_input: bool,

    /// Print the resolved commands without running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Write a starter config file to PATH and exit.
    #[arg(long, value_name = "PATH")]
    pub init_config: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
