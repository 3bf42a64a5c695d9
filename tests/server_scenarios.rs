// tests/server_scenarios.rs

mod common;

use std::sync::{Arc, Mutex};

use common::{connect, send_line, send_lines, start, start_with, wait_closed, with_timeout};
use taskstatus::codec::{Map, Value};
use taskstatus::dispatch::ResultEvents;
use taskstatus::fs::mock::MockFileSystem;
use taskstatus::job::JobContext;
use taskstatus::server::{ServerOptions, ServerState, StatusServer};
use taskstatus::state::{TaskId, TaskState};
use tokio::io::AsyncWriteExt;
use taskstatus_test_utils::builders::{MessageBuilder, passing_task};
use taskstatus_test_utils::recording::Recorded;

fn bucket(report: &taskstatus::CollectorReport, name: &str) -> Vec<String> {
    report
        .results
        .get(name)
        .iter()
        .map(|id| id.to_string())
        .collect()
}

#[tokio::test]
async fn pending_drain_stops_the_server() {
    let h = start(&["t1", "t2"]).await;
    let mut stream = connect(h.addr()).await;

    send_lines(
        &mut stream,
        &[
            r#"{"status":"started","id":"t1","time":1.0}"#,
            r#"{"status":"started","id":"t2","time":1.1}"#,
            r#"{"status":"running","id":"t1","type":"log","log":"hello"}"#,
            r#"{"status":"finished","id":"t1","time":2.0,"result":"pass"}"#,
            r#"{"status":"finished","id":"t2","time":2.5,"result":"fail"}"#,
        ],
    )
    .await;

    let debug_log = h.task_dir("t1").join("debug.log");
    let report = with_timeout(h.handle.await_done()).await.unwrap();

    assert_eq!(report.ended_by, ServerState::Draining);
    assert_eq!(bucket(&report, "pass"), vec!["t1"]);
    assert_eq!(bucket(&report, "fail"), vec!["t2"]);
    assert_eq!(report.results.len(), 2);
    assert!(report.pending.is_empty());
    assert!(report.all_pending_finished());

    assert_eq!(std::fs::read_to_string(debug_log).unwrap(), "hello\n");

    let t1 = report.registry.get("t1").unwrap();
    let t2 = report.registry.get("t2").unwrap();
    assert!((t1.time_elapsed.unwrap() - 1.0).abs() < 1e-9);
    assert!((t2.time_elapsed.unwrap() - 1.4).abs() < 1e-9);

    assert_eq!(
        h.recording.events(),
        vec![
            Recorded::Start("t1".into()),
            Recorded::Start("t2".into()),
            Recorded::End("t1".into(), "PASS".into()),
            Recorded::End("t2".into(), "FAIL".into()),
        ]
    );
}

#[tokio::test]
async fn sentinel_stops_with_pending_tasks_left() {
    let h = start(&["t1"]).await;
    let mut stream = connect(h.addr()).await;
    send_line(&mut stream, "bye").await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(report.ended_by, ServerState::Draining);
    assert!(report.results.is_empty());
    assert_eq!(report.pending, vec![TaskId::from("t1")]);
    assert_eq!(report.stats.sentinels, 1);
}

#[tokio::test]
async fn malformed_line_closes_only_that_connection() {
    let h = start(&[]).await;

    let mut first = connect(h.addr()).await;
    send_lines(
        &mut first,
        &[
            "not json",
            r#"{"status":"started","id":"t1","time":1.0}"#,
        ],
    )
    .await;
    with_timeout(wait_closed(&mut first)).await;

    let mut second = connect(h.addr()).await;
    send_lines(
        &mut second,
        &[r#"{"status":"started","id":"t2","time":1.0}"#, "bye"],
    )
    .await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(report.stats.decode_errors, 1);
    assert!(report.registry.get("t1").is_none());
    assert!(report.registry.get("t2").is_some());
}

#[tokio::test]
async fn unknown_task_is_dropped() {
    let h = start(&[]).await;
    let mut stream = connect(h.addr()).await;
    send_lines(
        &mut stream,
        &[
            r#"{"status":"finished","id":"tX","time":2.0,"result":"pass"}"#,
            r#"{"status":"running","id":"tX","type":"log","log":"lost"}"#,
            "bye",
        ],
    )
    .await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert!(report.results.is_empty());
    assert!(report.registry.is_empty());
    assert_eq!(report.stats.unknown_tasks, 2);
    assert!(h.recording.events().is_empty());
}

#[tokio::test]
async fn base64_payload_reaches_check_test_as_bytes() {
    let h = start(&["t1"]).await;
    let mut stream = connect(h.addr()).await;
    send_lines(
        &mut stream,
        &[
            MessageBuilder::started("t1", 1.0).line(),
            r#"{"status":"finished","id":"t1","time":2.0,"result":"pass","stdout":{"__base64_encoded__":"aGk="}}"#
                .to_string(),
        ],
    )
    .await;

    with_timeout(h.handle.await_done()).await.unwrap();

    let records = h.recording.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("stdout"), Some(&Value::Bytes(b"hi".to_vec())));
    assert_eq!(records[0].get("status"), Some(&Value::from("PASS")));
}

#[tokio::test]
async fn interleaved_connections_are_both_applied() {
    let h = start(&["a", "b"]).await;
    let mut ca = connect(h.addr()).await;
    let mut cb = connect(h.addr()).await;

    send_line(&mut ca, &MessageBuilder::started("a", 1.0).line()).await;
    send_line(&mut cb, &MessageBuilder::started("b", 1.0).line()).await;
    send_line(&mut ca, &MessageBuilder::finished("a", 2.0, "pass").line()).await;
    send_line(&mut cb, &MessageBuilder::finished("b", 3.0, "pass").line()).await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(report.registry.len(), 2);
    let mut passed = bucket(&report, "pass");
    passed.sort();
    assert_eq!(passed, vec!["a", "b"]);
}

#[tokio::test]
async fn finish_order_on_one_connection_is_kept() {
    let ids = ["c", "a", "b"];
    let h = start(&ids).await;
    let mut stream = connect(h.addr()).await;
    for id in ids {
        send_line(&mut stream, &MessageBuilder::started(id, 0.0).line()).await;
    }
    for id in ids {
        send_line(&mut stream, &MessageBuilder::finished(id, 1.0, "pass").line()).await;
    }

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(bucket(&report, "pass"), vec!["c", "a", "b"]);
}

#[tokio::test]
async fn repeated_sentinels_are_harmless() {
    let h = start(&[]).await;
    let mut first = connect(h.addr()).await;
    let mut second = connect(h.addr()).await;

    // The server may close either socket as soon as the first `bye` lands.
    let _ = first.write_all(b"bye\nbye\n").await;
    let _ = second.write_all(b"bye\n").await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(report.ended_by, ServerState::Draining);
    assert!(report.stats.sentinels >= 1);
}

#[tokio::test]
async fn idle_connections_do_not_block_drain() {
    let h = start(&["t1"]).await;
    let mut idle = connect(h.addr()).await;
    let mut worker = connect(h.addr()).await;

    send_lines(&mut worker, &passing_task("t1", 1.0)).await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(bucket(&report, "pass"), vec!["t1"]);
    with_timeout(wait_closed(&mut idle)).await;
}

#[tokio::test]
async fn stop_cancels_a_listening_server() {
    let mut h = start(&["never"]).await;
    assert_eq!(h.handle.state(), ServerState::Listening);

    h.handle.stop();
    h.handle.stop();
    assert_eq!(
        with_timeout(h.handle.wait_for(ServerState::Stopped)).await,
        ServerState::Stopped
    );

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(report.ended_by, ServerState::Canceled);
    assert_eq!(report.pending, vec![TaskId::from("never")]);
    assert!(report.registry.is_empty());
}

#[tokio::test]
async fn no_new_connections_after_stop() {
    let h = start(&[]).await;
    let addr = h.addr();
    h.handle.stop();
    with_timeout(h.handle.await_done()).await.unwrap();

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn failing_listener_is_counted_and_others_still_called() {
    let h = start_with(&["t1"], |server, recording| {
        server
            .with_listener(Box::new(recording.failing_listener("broken")))
            .with_listener(Box::new(recording.listener("ok")))
    })
    .await;

    let mut stream = connect(h.addr()).await;
    send_lines(&mut stream, &passing_task("t1", 1.0)).await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    // One failure per callback of the broken listener.
    assert_eq!(report.stats.handler_errors, 2);
    // Sink plus both listeners, for start and end.
    assert_eq!(h.recording.events().len(), 6);
    assert_eq!(bucket(&report, "pass"), vec!["t1"]);
}

#[tokio::test]
async fn tagged_stdout_bytes_are_written_raw() {
    let h = start(&["t1"]).await;
    let mut stream = connect(h.addr()).await;
    let payload = [0xff, b'h', b'i', 0x00];

    send_lines(
        &mut stream,
        &[
            MessageBuilder::started("t1", 1.0).line(),
            MessageBuilder::bytes("t1", "stdout", "log", &payload).line(),
            MessageBuilder::bytes("t1", "stderr", "log", b"oops").line(),
            MessageBuilder::finished("t1", 2.0, "pass").line(),
        ],
    )
    .await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(report.stats.protocol_errors, 0);
    assert_eq!(report.stats.handler_errors, 0);

    let mut expected = payload.to_vec();
    expected.push(b'\n');
    assert_eq!(std::fs::read(h.job.test_results_dir().join("t1").join("stdout")).unwrap(), expected);
    assert_eq!(
        std::fs::read_to_string(h.job.test_results_dir().join("t1").join("stderr")).unwrap(),
        "oops\n"
    );
}

#[tokio::test]
async fn file_system_failures_are_counted_per_task() {
    let fs = MockFileSystem::new();
    let shared = fs.clone();
    let h = start_with(&["good", "bad"], move |server, _| {
        server.with_file_system(Arc::new(shared))
    })
    .await;
    fs.fail_under(h.job.test_results_dir().join("bad"));

    let mut stream = connect(h.addr()).await;
    send_lines(&mut stream, &passing_task("good", 1.0)).await;
    send_lines(&mut stream, &passing_task("bad", 1.0)).await;

    let report = with_timeout(h.handle.await_done()).await.unwrap();

    // Directory creation and the log append both fail for "bad".
    assert_eq!(report.stats.handler_errors, 2);
    assert_eq!(bucket(&report, "pass"), vec!["good", "bad"]);
    assert_eq!(
        fs.read_to_string(h.job.test_results_dir().join("good").join("debug.log")).unwrap(),
        "good says hello\n"
    );
    assert!(fs.read(h.job.test_results_dir().join("bad").join("debug.log")).is_err());
    // Nothing touched the real disk.
    assert!(!h.job.test_results_dir().join("good").exists());
}

/// Remembers which thread each callback ran on.
struct ThreadNames(Arc<Mutex<Vec<Option<String>>>>);

impl ThreadNames {
    fn push(&self) {
        let name = std::thread::current().name().map(str::to_string);
        self.0.lock().unwrap().push(name);
    }
}

impl ResultEvents for ThreadNames {
    fn name(&self) -> &str {
        "threads"
    }

    fn start_test(&mut self, _state: &TaskState) -> anyhow::Result<()> {
        self.push();
        Ok(())
    }

    fn end_test(&mut self, _record: &Map) -> anyhow::Result<()> {
        self.push();
        Ok(())
    }
}

#[test]
fn explicit_runtime_runs_the_server() {
    let server_rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("status-server")
        .enable_all()
        .build()
        .unwrap();
    let client_rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let dir = tempfile::tempdir().unwrap();
    let job = JobContext::with_unique_id(dir.path(), "rt-job");

    let report = client_rt.block_on(async {
        let options = ServerOptions::new("127.0.0.1:0").with_pending(["t1"]);
        let handle = StatusServer::new(options, job.clone())
            .with_listener(Box::new(ThreadNames(seen.clone())))
            .with_runtime(server_rt.handle().clone())
            .start()
            .await
            .unwrap();

        let mut stream = connect(handle.local_addr()).await;
        send_lines(&mut stream, &passing_task("t1", 1.0)).await;
        with_timeout(handle.await_done()).await.unwrap()
    });

    assert_eq!(bucket(&report, "pass"), vec!["t1"]);
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|name| name.as_deref() == Some("status-server")));
    assert!(job.test_results_dir().join("t1").join("debug.log").exists());
}
