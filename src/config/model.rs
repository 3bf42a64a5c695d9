// src/config/model.rs

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

/// Status server address used when none is configured.
pub const DEFAULT_URI: &str = "127.0.0.1:8888";

/// Raw configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// uri = "127.0.0.1:8888"
/// verbose = true
///
/// [job]
/// logdir = "job-results"
/// pending = ["t1", "t2"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub job: JobSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// `host:port` to listen on.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Log task transitions at `info` instead of `debug`.
    #[serde(default)]
    pub verbose: bool,
}

fn default_uri() -> String {
    DEFAULT_URI.to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            verbose: false,
        }
    }
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSection {
    /// Job log directory; task results go to `<logdir>/test-results/`.
    #[serde(default)]
    pub logdir: Option<PathBuf>,

    /// Job id; derived from the log dir and clock when absent.
    #[serde(default)]
    pub unique_id: Option<String>,

    /// Tasks to wait for. Empty means "run until `bye` or Ctrl-C".
    #[serde(default)]
    pub pending: Vec<String>,

    /// Write `<logdir>/results.json` when the server stops.
    #[serde(default = "default_summary")]
    pub summary: bool,
}

fn default_summary() -> bool {
    true
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            logdir: None,
            unique_id: None,
            pending: Vec::new(),
            summary: default_summary(),
        }
    }
}

/// A parsed `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so the endpoint parses
/// and the log directory is set.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub endpoint: Endpoint,
    pub verbose: bool,
    pub logdir: PathBuf,
    pub unique_id: Option<String>,
    pub pending: Vec<String>,
    pub summary: bool,
}
