use std::fs;
use std::path::Path;
use std::time::Duration;

use bufsync_client::config::GlobalConfig;
use bufsync_client::editor::NullEditor;
use bufsync_client::session::{serve_lines, SessionEnd, SessionOptions};
use bufsync_common::content::md5_text;
use bufsync_common::diff::Patch;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{
    AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf,
};
use tokio::sync::broadcast;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

type ServerLines = Lines<BufReader<ReadHalf<DuplexStream>>>;

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, event: Value) {
    let mut line = serde_json::to_vec(&event).unwrap();
    line.push(b'\n');
    writer.write_all(&line).await.unwrap();
}

async fn next_event(lines: &mut ServerLines) -> Value {
    let line = lines.next_line().await.unwrap().expect("session closed before an event arrived");
    serde_json::from_str(&line).unwrap()
}

async fn assert_closed(lines: &mut ServerLines) {
    assert_eq!(lines.next_line().await.unwrap(), None);
}

async fn wait_for_file(path: &Path, expected: &str) {
    for _ in 0..100 {
        if fs::read_to_string(path).is_ok_and(|text| text == expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never contained {expected:?}", path.display());
}

#[tokio::test]
async fn shares_on_join_and_stops_on_disconnect() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello").unwrap();

    let (server, client) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    let (server_read, mut server_write) = tokio::io::split(server);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let options = SessionOptions { share: true, ..SessionOptions::default() };

    let serve = serve_lines(
        client_read,
        client_write,
        tmp.path().to_path_buf(),
        GlobalConfig::default(),
        NullEditor,
        options,
        shutdown_rx,
    );
    let script = async move {
        let mut lines = BufReader::new(server_read).lines();
        send(&mut server_write, json!({"name": "room_info", "perms": ["patch"], "bufs": {}}))
            .await;

        let created = next_event(&mut lines).await;
        assert_eq!(
            created,
            json!({"name": "create_buf", "path": "a.txt", "buf": "hello", "encoding": "utf8"})
        );

        send(&mut server_write, json!({"name": "disconnect", "reason": "bye"})).await;
        assert_closed(&mut lines).await;
    };

    let (end, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(serve, script) })
        .await
        .expect("session should finish");
    assert_eq!(end.unwrap(), SessionEnd::Disconnected);
}

#[tokio::test]
async fn applies_remote_edits_and_refetches_on_divergence() {
    let tmp = TempDir::new().unwrap();

    let (server, client) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    let (server_read, mut server_write) = tokio::io::split(server);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let serve = serve_lines(
        client_read,
        client_write,
        tmp.path().to_path_buf(),
        GlobalConfig::default(),
        NullEditor,
        SessionOptions::default(),
        shutdown_rx,
    );
    let file = tmp.path().join("notes/a.txt");
    let script = async move {
        let mut lines = BufReader::new(server_read).lines();
        let seed = json!({"name": "get_buf", "id": 5, "path": "notes/a.txt", "buf": "hello"});
        send(&mut server_write, seed).await;

        let edit = Patch::make("hello", "hello world");
        send(
            &mut server_write,
            json!({
                "name": "patch",
                "id": 5,
                "patch": edit.to_text(),
                "md5_before": md5_text("hello"),
                "md5_after": md5_text("hello world")
            }),
        )
        .await;
        wait_for_file(&file, "hello world").await;

        let stale = Patch::make("goodbye", "goodbye moon");
        send(
            &mut server_write,
            json!({
                "name": "patch",
                "id": 5,
                "patch": stale.to_text(),
                "md5_before": md5_text("goodbye"),
                "md5_after": md5_text("goodbye moon")
            }),
        )
        .await;
        assert_eq!(next_event(&mut lines).await, json!({"name": "get_buf", "id": 5}));

        server_write.shutdown().await.unwrap();
        assert_closed(&mut lines).await;
        file
    };

    let (end, file) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(serve, script) })
        .await
        .expect("session should finish");
    assert_eq!(end.unwrap(), SessionEnd::InboundClosed);
    assert_eq!(fs::read_to_string(file).unwrap(), "hello world");
}

#[tokio::test]
async fn shutdown_signal_tears_the_session_down() {
    let tmp = TempDir::new().unwrap();

    let (server, client) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    let (server_read, mut server_write) = tokio::io::split(server);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let serve = serve_lines(
        client_read,
        client_write,
        tmp.path().to_path_buf(),
        GlobalConfig::default(),
        NullEditor,
        SessionOptions::default(),
        shutdown_rx,
    );
    let script = async move {
        let mut lines = BufReader::new(server_read).lines();
        send(
            &mut server_write,
            json!({
                "name": "room_info",
                "perms": ["patch"],
                "bufs": {"9": {"id": 9, "path": "remote.txt", "md5": md5_text("remote")}}
            }),
        )
        .await;
        assert_eq!(next_event(&mut lines).await, json!({"name": "get_buf", "id": 9}));

        shutdown_tx.send(()).unwrap();
        assert_closed(&mut lines).await;
    };

    let (end, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(serve, script) })
        .await
        .expect("session should finish");
    assert_eq!(end.unwrap(), SessionEnd::Shutdown);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watched_files_are_uploaded_after_join() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().canonicalize().unwrap();

    let (server, client) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    let (server_read, mut server_write) = tokio::io::split(server);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let options = SessionOptions { watch: true, ..SessionOptions::default() };

    let serve = serve_lines(
        client_read,
        client_write,
        root.clone(),
        GlobalConfig::default(),
        NullEditor,
        options,
        shutdown_rx,
    );
    let script = async move {
        let mut lines = BufReader::new(server_read).lines();
        send(
            &mut server_write,
            json!({
                "name": "room_info",
                "perms": ["patch"],
                "bufs": {"1": {"id": 1, "path": "seed.txt", "md5": md5_text("seed")}}
            }),
        )
        .await;
        // The refetch proves the join was handled and the session is writable.
        assert_eq!(next_event(&mut lines).await, json!({"name": "get_buf", "id": 1}));

        fs::write(root.join("fresh.txt"), "fresh").unwrap();
        let created = next_event(&mut lines).await;
        assert_eq!(created["name"], "create_buf");
        assert_eq!(created["path"], "fresh.txt");
        assert_eq!(created["buf"], "fresh");

        server_write.shutdown().await.unwrap();
        assert_closed(&mut lines).await;
    };

    let (end, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(serve, script) })
        .await
        .expect("session should finish");
    assert_eq!(end.unwrap(), SessionEnd::InboundClosed);
}
