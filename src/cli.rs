// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{DEFAULT_URI, RawConfigFile};

/// Command-line arguments for `taskstatus`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskstatus",
    version,
    about = "Collect task status messages from test runners over TCP.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKSTATUS_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a status server until every pending task finished, a client sent
    /// `bye`, or Ctrl-C.
    Serve(ServeArgs),

    /// Send JSON lines read from stdin to a status server.
    Send(SendArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `TaskStatus.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding `[server].uri`.
    #[arg(long, value_name = "HOST:PORT")]
    pub uri: Option<String>,

    /// Job log directory, overriding `[job].logdir`.
    #[arg(long, value_name = "DIR")]
    pub logdir: Option<PathBuf>,

    /// Task id to wait for; repeatable. Replaces `[job].pending`.
    #[arg(long = "pending", value_name = "ID")]
    pub pending: Vec<String>,

    /// Log task transitions at info level.
    #[arg(long)]
    pub verbose: bool,

    /// Do not write `<logdir>/results.json`.
    #[arg(long)]
    pub no_summary: bool,
}

impl ServeArgs {
    /// Apply command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, raw: &mut RawConfigFile) {
        if let Some(uri) = &self.uri {
            raw.server.uri = uri.clone();
        }
        if let Some(logdir) = &self.logdir {
            raw.job.logdir = Some(logdir.clone());
        }
        if !self.pending.is_empty() {
            raw.job.pending = self.pending.clone();
        }
        if self.verbose {
            raw.server.verbose = true;
        }
        if self.no_summary {
            raw.job.summary = false;
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SendArgs {
    /// Status server address.
    #[arg(long, value_name = "HOST:PORT", default_value = DEFAULT_URI)]
    pub uri: String,

    /// Send `bye` after the last line, stopping the server.
    #[arg(long)]
    pub bye: bool,
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
