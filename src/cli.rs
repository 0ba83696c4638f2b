// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::ScoringKind;

/// Command-line arguments for `kernelgate`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kernelgate",
    version,
    about = "Interactive code execution sessions and answer scoring.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Kernelgate.toml` in the current working directory, if it
    /// exists; built-in defaults otherwise.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KERNELGATE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse + validate config and catalog, print a summary, run nothing.
    Check,

    /// Start a session and relay JSON lines between it and stdin/stdout.
    Repl {
        /// Session id to start under; random if omitted.
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },

    /// Score one submission and print the response.
    Score {
        #[arg(long, value_name = "ID")]
        problem: String,

        #[arg(long, value_name = "ID")]
        question: String,

        /// `literal` or `code`.
        #[arg(long, value_name = "KIND")]
        kind: ScoringKind,

        /// One submitted answer; repeat for several.
        #[arg(long = "answer", value_name = "TEXT")]
        answers: Vec<String>,

        #[arg(long, value_name = "KEY", default_value = "cli")]
        job_key: String,
    },

    /// Print stored progress for a problem.
    Progress {
        #[arg(long, value_name = "ID")]
        problem: String,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
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
