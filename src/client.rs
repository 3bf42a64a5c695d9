// src/client.rs

//! Minimal client for the status protocol, as used by task runners.
//!
//! One connection, one JSON object per line. Values containing
//! [`Value::Bytes`] are sent base64-tagged.

use std::net::SocketAddr;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::debug;

use crate::codec::{self, Map, SENTINEL, Value};
use crate::config::parse_uri;
use crate::errors::{CollectorError, Result};

#[derive(Debug)]
pub struct StatusClient {
    stream: BufWriter<TcpStream>,
    peer: SocketAddr,
}

impl StatusClient {
    /// Connect to a status server at `host:port`.
    pub async fn connect(uri: &str) -> Result<Self> {
        let endpoint = parse_uri(uri)?;
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|err| {
                CollectorError::Other(anyhow::Error::new(err).context(format!(
                    "could not connect to status server at {endpoint}"
                )))
            })?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "connected to status server");
        Ok(Self {
            stream: BufWriter::new(stream),
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one message and flush it.
    pub async fn post(&mut self, value: &Value) -> Result<()> {
        let line = codec::encode(value);
        self.write_line(line.as_bytes()).await
    }

    pub async fn post_map(&mut self, map: &Map) -> Result<()> {
        let line = codec::encode_map(map);
        self.write_line(line.as_bytes()).await
    }

    /// Send a pre-encoded line as-is. A trailing newline is added if missing.
    pub async fn post_raw(&mut self, line: &str) -> Result<()> {
        self.write_line(line.trim_end_matches(['\r', '\n']).as_bytes())
            .await
    }

    /// Ask the server to shut down, then close.
    pub async fn bye(mut self) -> Result<()> {
        self.write_line(SENTINEL).await?;
        self.close().await
    }

    /// Close the write side; the server sees end of stream.
    pub async fn close(mut self) -> Result<()> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.stream.write_all(line).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }
}
