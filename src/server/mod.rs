// src/server/mod.rs

//! Status server lifecycle.
//!
//! An unstarted [`StatusServer`] holds options and collaborators. `start`
//! binds the listening socket, spawns the collector and the accept loop and
//! returns a [`ServerHandle`]:
//!
//! ```text
//! Listening --(pending drained | bye)--> Draining --> Stopped
//! Listening --(ServerHandle::stop)-----> Canceled --> Stopped
//! ```
//!
//! Bind failures are reported by `start` itself.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collector::Collector;
use crate::config::{ConfigFile, DEFAULT_URI, parse_uri};
use crate::dispatch::{Dispatcher, NullSink, ResultEvents, ResultSink};
use crate::engine::MessageProcessor;
use crate::errors::{CollectorError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::JobContext;
use crate::state::{CollectorState, PendingSet};

pub mod connection;
mod listener;
mod report;

pub use connection::{ConnectionEnd, handle_connection};
pub use report::CollectorReport;

/// Queue depth between connection handlers and the collector.
const EVENT_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Listening,
    /// Every pending task finished, or a peer sent `bye`.
    Draining,
    /// Stopped from outside.
    Canceled,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Listening => "listening",
            ServerState::Draining => "draining",
            ServerState::Canceled => "canceled",
            ServerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// `host:port`; port 0 picks a free port.
    pub uri: String,
    /// Tasks to wait for. Empty means "run until `bye` or stop".
    pub tasks_pending: Vec<String>,
    pub verbose: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            tasks_pending: Vec::new(),
            verbose: false,
        }
    }
}

impl ServerOptions {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn with_pending<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks_pending = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl From<&ConfigFile> for ServerOptions {
    fn from(cfg: &ConfigFile) -> Self {
        Self {
            uri: cfg.endpoint.to_string(),
            tasks_pending: cfg.pending.clone(),
            verbose: cfg.verbose,
        }
    }
}

/// A configured, not yet listening server.
pub struct StatusServer {
    options: ServerOptions,
    job: JobContext,
    fs: Arc<dyn FileSystem>,
    sink: Box<dyn ResultSink>,
    dispatcher: Dispatcher,
    runtime: Option<Handle>,
}

impl fmt::Debug for StatusServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusServer")
            .field("options", &self.options)
            .field("job", &self.job)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl StatusServer {
    /// Server writing to the real filesystem, with no result sink and no
    /// listeners.
    pub fn new(options: ServerOptions, job: JobContext) -> Self {
        Self {
            options,
            job,
            fs: Arc::new(RealFileSystem),
            sink: Box::new(NullSink),
            dispatcher: Dispatcher::new(),
            runtime: None,
        }
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_result_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a listener; may be called repeatedly.
    pub fn with_listener(mut self, listener: Box<dyn ResultEvents>) -> Self {
        self.dispatcher.register(listener);
        self
    }

    /// Spawn server tasks on `handle` instead of the current runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Bind and start serving.
    ///
    /// The socket is bound on the server's runtime so that its IO is driven
    /// there, not by the caller's runtime.
    pub async fn start(self) -> Result<ServerHandle> {
        let endpoint = parse_uri(&self.options.uri)?;
        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::current(),
        };

        let addr = (endpoint.host.clone(), endpoint.port);
        let listener = runtime
            .spawn(async move { TcpListener::bind(addr).await })
            .await
            .map_err(|err| CollectorError::Other(anyhow::anyhow!("bind task failed: {err}")))?
            .map_err(|source| CollectorError::Bind {
                addr: endpoint.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let pending = PendingSet::new(self.options.tasks_pending.iter().map(String::as_str));
        info!(
            %local_addr,
            pending = pending.len(),
            logdir = %self.job.logdir().display(),
            job = self.job.unique_id(),
            "status server listening"
        );

        let cancel = CancellationToken::new();
        let shutdown = cancel.child_token();
        let (state_tx, state_rx) = watch::channel(ServerState::Listening);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let collector = Collector::new(
            CollectorState::new(pending),
            MessageProcessor::new(self.job, self.options.verbose),
            self.fs,
            self.sink,
            self.dispatcher,
            event_rx,
            shutdown.clone(),
        );

        let collector = runtime.spawn(collector.run());
        let task = runtime.spawn(
            listener::AcceptLoop {
                listener,
                cancel: cancel.clone(),
                shutdown,
                events: event_tx,
                state: state_tx,
                collector,
            }
            .run(),
        );

        Ok(ServerHandle {
            local_addr,
            cancel,
            state: state_rx,
            task,
        })
    }
}

/// Handle to a running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    state: watch::Receiver<ServerState>,
    task: JoinHandle<Result<CollectorReport>>,
}

impl ServerHandle {
    /// Bound address; useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Ask the server to stop. Idempotent; a server that is already draining
    /// keeps its `Draining` outcome.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Token that stops the server when cancelled, e.g. from a signal task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until the server reaches `state` (or has stopped).
    pub async fn wait_for(&mut self, state: ServerState) -> ServerState {
        let seen = self
            .state
            .wait_for(|s| *s == state || *s == ServerState::Stopped)
            .await
            .map(|s| *s);
        seen.unwrap_or(ServerState::Stopped)
    }

    /// Wait for the server to stop and return what it collected.
    pub async fn await_done(self) -> Result<CollectorReport> {
        self.task.await.map_err(|err| {
            CollectorError::Other(anyhow::anyhow!("status server task failed: {err}"))
        })?
    }
}
