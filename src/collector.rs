// src/collector.rs

//! The collector task: async IO shell around [`MessageProcessor`].
//!
//! All collector state is pinned to this one task. Connection handlers send
//! [`CollectorEvent`]s over an mpsc channel and, for messages, wait for an
//! acknowledgement, so each message is fully applied (state update plus
//! effects) before its connection reads the next line.
//!
//! The task ends when every event sender is gone and returns the final
//! [`CollectorState`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{DecodeError, Map};
use crate::dispatch::{Dispatcher, ResultSink};
use crate::engine::{Effect, MessageProcessor};
use crate::errors::CollectorError;
use crate::fs::FileSystem;
use crate::state::CollectorState;

/// Events flowing from connection handlers into the collector.
#[derive(Debug)]
pub enum CollectorEvent {
    /// A decoded message; `done` fires once it has been fully applied.
    Message {
        peer: SocketAddr,
        fields: Map,
        done: oneshot::Sender<()>,
    },
    /// A line could not be decoded; its connection is closing.
    DecodeFailed {
        peer: SocketAddr,
        error: DecodeError,
    },
    /// A peer sent the `bye` sentinel.
    Sentinel { peer: SocketAddr },
}

pub struct Collector {
    state: CollectorState,
    processor: MessageProcessor,
    fs: Arc<dyn FileSystem>,
    sink: Box<dyn ResultSink>,
    dispatcher: Dispatcher,
    events: mpsc::Receiver<CollectorEvent>,
    /// Cancelled when every pending task has finished.
    shutdown: CancellationToken,
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("state", &self.state)
            .field("processor", &self.processor)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Collector {
    pub fn new(
        state: CollectorState,
        processor: MessageProcessor,
        fs: Arc<dyn FileSystem>,
        sink: Box<dyn ResultSink>,
        dispatcher: Dispatcher,
        events: mpsc::Receiver<CollectorEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            processor,
            fs,
            sink,
            dispatcher,
            events,
            shutdown,
        }
    }

    /// Main loop. Runs until the event channel closes.
    pub async fn run(mut self) -> CollectorState {
        debug!("collector started");

        while let Some(event) = self.events.recv().await {
            match event {
                CollectorEvent::Message { peer, fields, done } => {
                    self.apply(peer, fields).await;
                    // The handler may already be gone; nothing to do then.
                    let _ = done.send(());
                }
                CollectorEvent::DecodeFailed { peer, error } => {
                    self.state.stats.decode_errors += 1;
                    let err = CollectorError::Decode {
                        peer,
                        source: error,
                    };
                    warn!(error = %err, "closing connection after malformed line");
                }
                CollectorEvent::Sentinel { peer } => {
                    self.state.stats.sentinels += 1;
                    if !self.shutdown.is_cancelled() {
                        info!(%peer, "shutdown requested by sentinel");
                    }
                    self.shutdown.cancel();
                }
            }
        }

        debug!(stats = ?self.state.stats, "collector finished (channel closed)");
        self.state
    }

    async fn apply(&mut self, peer: SocketAddr, fields: Map) {
        debug!(%peer, "applying message");
        let step = self.processor.process_fields(&mut self.state, fields);

        for effect in step.effects {
            self.execute(effect).await;
        }

        if !step.keep_running && !self.shutdown.is_cancelled() {
            info!("all pending tasks finished; shutting down");
            self.shutdown.cancel();
        }
    }

    /// Execute one effect. Failures are logged and counted, never fatal.
    async fn execute(&mut self, effect: Effect) {
        let task = effect.task().clone();

        let failures: Vec<anyhow::Error> = match effect {
            Effect::CreateDir { path, .. } => {
                self.fs.create_dir_all(&path).await.err().into_iter().collect()
            }
            Effect::AppendLine { path, line, .. } => {
                self.fs.append_line(&path, &line).await.err().into_iter().collect()
            }
            Effect::StartTest { state } => {
                let mut failures: Vec<anyhow::Error> =
                    self.sink.start_test(&state).err().into_iter().collect();
                failures.extend(
                    self.dispatcher
                        .start_test(&state)
                        .into_iter()
                        .map(|(name, err)| err.context(format!("listener '{name}'"))),
                );
                failures
            }
            Effect::EndTest { record, .. } => {
                let mut failures: Vec<anyhow::Error> =
                    self.sink.check_test(&record).err().into_iter().collect();
                failures.extend(
                    self.dispatcher
                        .end_test(&record)
                        .into_iter()
                        .map(|(name, err)| err.context(format!("listener '{name}'"))),
                );
                failures
            }
        };

        for source in failures {
            self.state.stats.handler_errors += 1;
            let err = CollectorError::Handler {
                task: task.clone(),
                source,
            };
            error!(error = %err, cause = ?err, "result handler failed");
        }
    }
}
