// src/server/connection.rs

//! Per-connection handler.
//!
//! Reads newline-framed lines until EOF, a blank line, a malformed line, the
//! `bye` sentinel or server shutdown. Each decoded message is handed to the
//! collector and the handler waits until it has been applied before reading
//! the next line, so messages of one connection are processed in order.

use std::net::SocketAddr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::{self, DecodeError, Frame, MAX_LINE_BYTES};
use crate::collector::CollectorEvent;
use crate::errors::Result;

/// Why a connection handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Peer closed the stream.
    Eof,
    /// Peer sent an empty line.
    EmptyLine,
    /// Peer sent something that is not a JSON object.
    Malformed,
    /// Peer sent `bye`.
    Sentinel,
    /// The server is draining or was stopped.
    Shutdown,
    /// The collector is gone.
    CollectorClosed,
}

/// Serve one connection.
///
/// `shutdown` is both observed (checked before every read, and aborting a
/// read in progress) and triggered (on `bye`).
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    events: mpsc::Sender<CollectorEvent>,
    shutdown: CancellationToken,
) -> Result<ConnectionEnd>
where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::with_capacity(1024);

    loop {
        if shutdown.is_cancelled() {
            debug!(%peer, "server shutting down; closing connection");
            return Ok(ConnectionEnd::Shutdown);
        }

        line.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(%peer, "server shutting down; abandoning read");
                return Ok(ConnectionEnd::Shutdown);
            }
            read = read_frame(&mut reader, &mut line) => read?,
        };

        if read == 0 {
            debug!(%peer, "connection closed by peer");
            return Ok(ConnectionEnd::Eof);
        }

        if line.len() > MAX_LINE_BYTES {
            let _ = events
                .send(CollectorEvent::DecodeFailed {
                    peer,
                    error: DecodeError::LineTooLong,
                })
                .await;
            return Ok(ConnectionEnd::Malformed);
        }

        if codec::is_sentinel(&line) {
            shutdown.cancel();
            let _ = events.send(CollectorEvent::Sentinel { peer }).await;
            return Ok(ConnectionEnd::Sentinel);
        }

        let fields = match codec::decode(&line) {
            Ok(Frame::Message(fields)) => fields,
            Ok(Frame::EndOfStream) => {
                debug!(%peer, "empty line; closing connection");
                return Ok(ConnectionEnd::EmptyLine);
            }
            Err(error) => {
                let _ = events
                    .send(CollectorEvent::DecodeFailed { peer, error })
                    .await;
                return Ok(ConnectionEnd::Malformed);
            }
        };

        let (done, applied) = oneshot::channel();
        if events
            .send(CollectorEvent::Message { peer, fields, done })
            .await
            .is_err()
        {
            return Ok(ConnectionEnd::CollectorClosed);
        }
        // Not raced against shutdown: the message in flight is always
        // applied before the handler exits.
        if applied.await.is_err() {
            return Ok(ConnectionEnd::CollectorClosed);
        }
    }
}

/// Read one line, reading at most one byte past [`MAX_LINE_BYTES`].
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = (&mut *reader).take(MAX_LINE_BYTES as u64 + 1);
    limited.read_until(b'\n', buf).await
}
