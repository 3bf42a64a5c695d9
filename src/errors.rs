// src/errors.rs

//! Crate-wide error type and result alias.

use std::net::SocketAddr;

use thiserror::Error;

use crate::codec::DecodeError;
use crate::message::ProtocolError;
use crate::state::TaskId;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid status server URI '{uri}': {reason}")]
    Uri { uri: String, reason: String },

    #[error("Cannot bind status server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed line from {peer}: {source}")]
    Decode {
        peer: SocketAddr,
        #[source]
        source: DecodeError,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Task '{0}' already started")]
    DuplicateStart(TaskId),

    #[error("Task '{0}' was never started")]
    UnknownTask(TaskId),

    #[error("Task '{0}' already finished")]
    AlreadyFinished(TaskId),

    #[error("Handler failed for task '{task}': {source}")]
    Handler {
        task: TaskId,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CollectorError>;
