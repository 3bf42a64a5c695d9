// src/server/listener.rs

//! Accept loop and shutdown sequencing.
//!
//! Accepts connections until the shutdown token fires, then stops accepting,
//! waits for every connection handler, closes the collector's event channel
//! and collects the final state.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::CollectorEvent;
use crate::errors::{CollectorError, Result};
use crate::server::ServerState;
use crate::server::connection::{ConnectionEnd, handle_connection};
use crate::server::report::CollectorReport;
use crate::state::CollectorState;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub(crate) struct AcceptLoop {
    pub listener: TcpListener,
    /// External stop; cancelling it also cancels `shutdown`.
    pub cancel: CancellationToken,
    /// Child of `cancel`; also cancelled on drain or sentinel.
    pub shutdown: CancellationToken,
    pub events: mpsc::Sender<CollectorEvent>,
    pub state: watch::Sender<ServerState>,
    pub collector: JoinHandle<CollectorState>,
}

impl AcceptLoop {
    pub async fn run(self) -> Result<CollectorReport> {
        let AcceptLoop {
            listener,
            cancel,
            shutdown,
            events,
            state,
            collector,
        } = self;

        let mut connections: JoinSet<Result<ConnectionEnd>> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            events.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_connection_end(joined);
                }
            }
        }

        let ended_by = if cancel.is_cancelled() {
            ServerState::Canceled
        } else {
            ServerState::Draining
        };
        state.send_replace(ended_by);
        info!(state = %ended_by, open = connections.len(), "stopped accepting connections");

        drop(listener);
        while let Some(joined) = connections.join_next().await {
            log_connection_end(joined);
        }

        // Last sender: the collector sees the channel close and returns.
        drop(events);
        let final_state = collector.await.map_err(|err| {
            CollectorError::Other(anyhow::anyhow!("collector task failed: {err}"))
        })?;

        state.send_replace(ServerState::Stopped);
        info!(
            finished = final_state.results.total(),
            pending = final_state.pending.len(),
            "status server stopped"
        );

        Ok(CollectorReport::new(final_state, ended_by))
    }
}

fn log_connection_end(joined: std::result::Result<Result<ConnectionEnd>, JoinError>) {
    match joined {
        Ok(Ok(end)) => debug!(?end, "connection handler finished"),
        Ok(Err(err)) => warn!(error = %err, "connection handler failed"),
        Err(err) => warn!(error = %err, "connection handler panicked or was aborted"),
    }
}
