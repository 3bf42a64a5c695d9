// src/lib.rs

pub mod cli;
pub mod client;
pub mod codec;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod job;
pub mod logging;
pub mod message;
pub mod server;
pub mod state;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command, SendArgs, ServeArgs};
use crate::client::StatusClient;
use crate::config::{ConfigFile, default_config_path, load_from_path, load_or_default};
use crate::dispatch::LoggingEvents;
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::JobContext;
use crate::server::{ServerOptions, StatusServer};

pub use crate::server::{CollectorReport, ServerHandle, ServerState};

/// Summary file written into the job log directory on shutdown.
pub const SUMMARY_FILE: &str = "results.json";

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Send(send_args) => send(send_args).await,
    }
}

/// Load config, run a status server to completion and report the results.
async fn serve(args: ServeArgs) -> Result<()> {
    let mut raw = match &args.config {
        Some(path) => load_from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => load_or_default(default_config_path())?,
    };
    args.apply_overrides(&mut raw);
    let cfg = ConfigFile::try_from(raw)?;

    let job = match &cfg.unique_id {
        Some(id) => JobContext::with_unique_id(&cfg.logdir, id.clone()),
        None => JobContext::new(&cfg.logdir),
    };

    let handle = StatusServer::new(ServerOptions::from(&cfg), job.clone())
        .with_listener(Box::new(LoggingEvents::new(cfg.verbose)))
        .start()
        .await?;

    // Ctrl-C → cancel.
    {
        let token = handle.cancellation_token();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; stopping status server");
            token.cancel();
        });
    }

    let report = handle.await_done().await?;
    let text = serde_json::to_string_pretty(&report.summary())?;

    if cfg.summary {
        let path = job.logdir().join(SUMMARY_FILE);
        RealFileSystem.write(&path, text.as_bytes()).await?;
        info!(path = %path.display(), "wrote summary");
    }

    if !report.all_pending_finished() {
        warn!(
            pending = ?report.pending.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            "server stopped before every pending task finished"
        );
    }

    println!("{text}");
    Ok(())
}

/// Forward stdin lines to a status server.
async fn send(args: SendArgs) -> Result<()> {
    let mut client = StatusClient::connect(&args.uri).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0usize;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        client.post_raw(&line).await?;
        sent += 1;
    }

    info!(sent, peer = %client.peer_addr(), "lines sent");
    if args.bye {
        client.bye().await?;
    } else {
        client.close().await?;
    }
    Ok(())
}
