// tests/client_roundtrip.rs

mod common;

use common::{start, with_timeout};
use taskstatus::client::StatusClient;
use taskstatus::codec::{Map, Value};
use taskstatus::server::ServerState;

fn message(pairs: &[(&str, Value)]) -> Map {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn client_messages_land_in_task_files() {
    let h = start(&["t/1"]).await;
    let uri = h.addr().to_string();
    let mut client = StatusClient::connect(&uri).await.unwrap();

    client
        .post_map(&message(&[
            ("status", "started".into()),
            ("id", "t/1".into()),
            ("time", Value::from(10.0)),
        ]))
        .await
        .unwrap();
    for (kind, text) in [("stdout", "out line"), ("stderr", "err line"), ("whiteboard", "wb")] {
        client
            .post_map(&message(&[
                ("status", "running".into()),
                ("id", "t/1".into()),
                ("type", kind.into()),
                ("log", text.into()),
            ]))
            .await
            .unwrap();
    }
    client
        .post(&Value::Object(message(&[
            ("status", "finished".into()),
            ("id", "t/1".into()),
            ("time", Value::from(12.5)),
            ("result", "skip".into()),
            ("blob", Value::Bytes(vec![0, 159, 255])),
        ])))
        .await
        .unwrap();
    client.close().await.unwrap();

    let task_dir = h.task_dir("t_1");
    let report = with_timeout(h.handle.await_done()).await.unwrap();

    assert_eq!(report.ended_by, ServerState::Draining);
    assert_eq!(report.results.get("skip").len(), 1);
    assert_eq!(
        std::fs::read_to_string(task_dir.join("stdout")).unwrap(),
        "out line\n"
    );
    assert_eq!(
        std::fs::read_to_string(task_dir.join("stderr")).unwrap(),
        "err line\n"
    );
    assert_eq!(
        std::fs::read_to_string(task_dir.join("whiteboard")).unwrap(),
        "wb\n"
    );

    let records = h.recording.records();
    assert_eq!(records[0].get("blob"), Some(&Value::Bytes(vec![0, 159, 255])));
    assert_eq!(records[0].get("status"), Some(&Value::from("SKIP")));
    assert_eq!(records[0].get("logdir"), Some(&Value::from("")));
}

#[tokio::test]
async fn client_bye_stops_the_server() {
    let h = start(&[]).await;
    let client = StatusClient::connect(&h.addr().to_string()).await.unwrap();
    client.bye().await.unwrap();

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(report.stats.sentinels, 1);
    assert_eq!(report.stats.messages, 0);
}

#[tokio::test]
async fn raw_lines_are_trimmed_of_their_newline() {
    let h = start(&["t1"]).await;
    let mut client = StatusClient::connect(&h.addr().to_string()).await.unwrap();
    client
        .post_raw("{\"status\":\"started\",\"id\":\"t1\",\"time\":1}\n")
        .await
        .unwrap();
    client
        .post_raw("{\"status\":\"finished\",\"id\":\"t1\",\"time\":1,\"result\":\"error\"}\r\n")
        .await
        .unwrap();

    let report = with_timeout(h.handle.await_done()).await.unwrap();
    assert_eq!(report.results.get("error").len(), 1);
    assert_eq!(report.stats.messages, 2);
}
