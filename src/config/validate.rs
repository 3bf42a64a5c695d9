// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, Endpoint, RawConfigFile};
use crate::errors::{CollectorError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CollectorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let endpoint = parse_uri(&raw.server.uri)?;
        validate_pending(&raw.job.pending)?;

        let logdir = match raw.job.logdir {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => {
                return Err(CollectorError::Config(
                    "a job log directory is required ([job].logdir or --logdir)".to_string(),
                ));
            }
        };

        if let Some(id) = raw.job.unique_id.as_deref() {
            if id.trim().is_empty() {
                return Err(CollectorError::Config(
                    "[job].unique_id must not be empty".to_string(),
                ));
            }
        }

        Ok(ConfigFile {
            endpoint,
            verbose: raw.server.verbose,
            logdir,
            unique_id: raw.job.unique_id,
            pending: raw.job.pending,
            summary: raw.job.summary,
        })
    }
}

/// Parse a `host:port` URI. IPv6 hosts may be bracketed (`[::1]:8888`).
pub fn parse_uri(uri: &str) -> Result<Endpoint> {
    let invalid = |reason: &str| CollectorError::Uri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = uri
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(invalid("empty host"));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| invalid("port must be a number between 0 and 65535"))?;

    Ok(Endpoint {
        host: host.to_string(),
        port,
    })
}

fn validate_pending(pending: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in pending {
        if id.is_empty() {
            return Err(CollectorError::Config(
                "[job].pending must not contain empty task ids".to_string(),
            ));
        }
        if !seen.insert(id.as_str()) {
            return Err(CollectorError::Config(format!(
                "[job].pending lists task '{}' more than once",
                id
            )));
        }
    }
    Ok(())
}
