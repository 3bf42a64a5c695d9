#![allow(dead_code)]

use std::net::SocketAddr;

use taskstatus::job::JobContext;
use taskstatus::server::{ServerHandle, ServerOptions, StatusServer};
use taskstatus_test_utils::recording::Recording;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub use taskstatus_test_utils::{init_tracing, with_timeout};

/// A running server on an ephemeral port with a temporary job log dir.
pub struct Harness {
    pub dir: TempDir,
    pub job: JobContext,
    pub handle: ServerHandle,
    pub recording: Recording,
}

impl Harness {
    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    pub fn task_dir(&self, id: &str) -> std::path::PathBuf {
        self.job.test_results_dir().join(id)
    }
}

pub async fn start(pending: &[&str]) -> Harness {
    start_with(pending, |server, _| server).await
}

/// Start a server after letting the caller add collaborators.
pub async fn start_with<F>(pending: &[&str], configure: F) -> Harness
where
    F: FnOnce(StatusServer, &Recording) -> StatusServer,
{
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let job = JobContext::with_unique_id(dir.path(), "test-job");
    let recording = Recording::new();

    let options = ServerOptions::new("127.0.0.1:0")
        .with_pending(pending.iter().copied())
        .verbose(true);
    let server = StatusServer::new(options, job.clone())
        .with_result_sink(Box::new(recording.sink()));
    let handle = configure(server, &recording).start().await.unwrap();

    Harness {
        dir,
        job,
        handle,
        recording,
    }
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

pub async fn send_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();
    stream.flush().await.unwrap();
}

pub async fn send_lines<S: AsRef<str>>(stream: &mut TcpStream, lines: &[S]) {
    for line in lines {
        send_line(stream, line.as_ref()).await;
    }
}

/// Wait until the server closes `stream`. A reset counts as closed.
pub async fn wait_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}
