use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use bufsync_client::config::GlobalConfig;
use bufsync_client::editor::NullEditor;
use bufsync_client::engine::SyncEngine;
use bufsync_client::outbox::RecordingOutbox;
use bufsync_client::watcher::{ChangeKind, LocalChange};
use bufsync_common::content::md5_text;
use bufsync_common::diff::Patch;
use bufsync_common::protocol::{BufId, OutboundMessage};
use serde_json::json;
use tempfile::TempDir;

type Engine = SyncEngine<RecordingOutbox, NullEditor>;

fn engine_with(root: &Path, config: GlobalConfig) -> Engine {
    SyncEngine::new(root, &config, RecordingOutbox::new(), NullEditor)
}

fn writable(root: &Path) -> Engine {
    let mut engine = engine_with(root, GlobalConfig::default());
    engine.handle(json!({"name": "room_info", "perms": ["patch", "highlight"], "bufs": {}}));
    engine
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn created_paths(engine: &Engine) -> Vec<String> {
    engine
        .outbox()
        .sent()
        .iter()
        .filter_map(|message| match message {
            OutboundMessage::CreateBuf { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect()
}

fn change(kind: ChangeKind, path: impl AsRef<Path>) -> LocalChange {
    LocalChange { kind, path: path.as_ref().to_path_buf() }
}

#[test]
fn fifteen_files_are_shared_over_two_cycles() {
    let tmp = TempDir::new().unwrap();
    for index in 0..15 {
        write(tmp.path(), &format!("f{index:02}.txt"), &format!("file {index}"));
    }
    let mut engine = writable(tmp.path());

    engine.create_buf(tmp.path(), false);
    assert_eq!(engine.outbox().sent().len(), 10);
    assert!(engine.has_pending_scans());

    assert!(!engine.scan_cycle());
    assert_eq!(engine.outbox().sent().len(), 15);
    assert!(!engine.has_pending_scans());

    let mut paths = created_paths(&engine);
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 15);
}

#[test]
fn share_skips_hidden_and_ignored_entries() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), ".gitignore", "*.log\nbuild/\n");
    write(tmp.path(), "notes.md", "notes");
    write(tmp.path(), "debug.log", "noise");
    write(tmp.path(), "build/out.txt", "artifact");
    write(tmp.path(), ".git/HEAD", "ref: refs/heads/main");
    write(tmp.path(), "node_modules/pkg/index.js", "module.exports = 1;");
    write(tmp.path(), "docs/.bufsyncignore", "draft.md\n");
    write(tmp.path(), "docs/draft.md", "draft");
    write(tmp.path(), "docs/final.md", "final");
    let mut engine = writable(tmp.path());

    engine.create_buf(tmp.path(), false);
    while engine.scan_cycle() {}

    let mut paths = created_paths(&engine);
    paths.sort();
    assert_eq!(paths, vec![".gitignore", "docs/.bufsyncignore", "docs/final.md", "notes.md"]);
}

#[test]
fn session_shares_root_after_room_info() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", "a");
    let mut engine = engine_with(tmp.path(), GlobalConfig::default());
    engine.share_after_join(tmp.path());
    assert!(engine.outbox().sent().is_empty());

    engine.handle(json!({"name": "room_info", "perms": ["patch"], "bufs": {}}));

    assert_eq!(created_paths(&engine), vec!["a.txt"]);
}

#[test]
fn watched_file_changes_are_uploaded() {
    let tmp = TempDir::new().unwrap();
    let mut engine = writable(tmp.path());
    engine.handle(json!({"name": "get_buf", "id": 1, "path": "a.txt", "buf": "one"}));
    engine.outbox_mut().take();

    // Our own write is still paused; wait out the pause window.
    std::thread::sleep(Duration::from_millis(600));
    write(tmp.path(), "a.txt", "two");
    write(tmp.path(), "b.txt", "new");
    write(tmp.path(), ".env", "SECRET=1");
    engine.local_change(change(ChangeKind::Modified, tmp.path().join("a.txt")));
    engine.local_change(change(ChangeKind::Created, tmp.path().join("b.txt")));
    engine.local_change(change(ChangeKind::Created, tmp.path().join(".env")));

    assert_eq!(engine.outbox().names(), vec!["set_buf", "create_buf"]);
}

#[test]
fn writes_from_the_server_do_not_echo_back() {
    let tmp = TempDir::new().unwrap();
    let mut engine = writable(tmp.path());
    engine.handle(json!({"name": "get_buf", "id": 1, "path": "a.txt", "buf": "remote"}));
    engine.outbox_mut().take();

    engine.local_change(change(ChangeKind::Modified, tmp.path().join("a.txt")));

    assert!(engine.outbox().sent().is_empty());
}

#[test]
fn local_changes_are_dropped_while_read_only() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", "a");
    let mut engine = engine_with(tmp.path(), GlobalConfig::default());

    engine.local_change(change(ChangeKind::Created, tmp.path().join("a.txt")));

    assert!(engine.is_read_only());
    assert!(engine.outbox().sent().is_empty());
}

#[test]
fn removed_directory_deletes_every_buffer_under_it() {
    let tmp = TempDir::new().unwrap();
    let mut engine = writable(tmp.path());
    for (id, path) in [(1, "docs/a.md"), (2, "docs/sub/b.md"), (3, "docsx/c.md")] {
        engine.handle(json!({"name": "get_buf", "id": id, "path": path, "buf": "x"}));
    }
    engine.outbox_mut().take();
    fs::remove_dir_all(tmp.path().join("docs")).unwrap();

    engine.local_change(change(ChangeKind::Removed, tmp.path().join("docs")));

    assert_eq!(
        engine.outbox().sent(),
        [OutboundMessage::DeleteBuf { id: BufId(1) }, OutboundMessage::DeleteBuf { id: BufId(2) }]
    );
}

#[test]
fn sparse_mode_uploads_only_tracked_files() {
    let tmp = TempDir::new().unwrap();
    let mut config = GlobalConfig::default();
    config.sync.sparse_mode = true;
    let mut engine = engine_with(tmp.path(), config);
    engine.handle(json!({"name": "room_info", "perms": ["patch"], "bufs": {}}));
    engine.handle(json!({"name": "get_buf", "id": 1, "path": "tracked.txt", "buf": "old"}));

    std::thread::sleep(Duration::from_millis(600));
    write(tmp.path(), "tracked.txt", "new");
    write(tmp.path(), "untracked.txt", "new");
    engine.local_change(change(ChangeKind::Modified, tmp.path().join("tracked.txt")));
    engine.local_change(change(ChangeKind::Created, tmp.path().join("untracked.txt")));

    assert_eq!(engine.outbox().names(), vec!["set_buf"]);
}

#[test]
fn exhausted_refetch_leaves_buffer_unpopulated() {
    let tmp = TempDir::new().unwrap();
    let mut config = GlobalConfig::default();
    config.refetch.max_attempts = 2;
    let mut engine = engine_with(tmp.path(), config);
    engine.handle(json!({"name": "get_buf", "id": 1, "path": "a.txt", "buf": "goodbye"}));

    let patch = Patch::make("hello", "hello world");
    let event = json!({
        "name": "patch",
        "id": 1,
        "patch": patch.to_text(),
        "md5_before": md5_text("hello"),
        "md5_after": md5_text("hello world")
    });
    engine.handle(event.clone());
    assert_eq!(engine.outbox().names(), vec!["get_buf"]);

    let later = Instant::now() + Duration::from_secs(3_600);
    engine.refetch_tick(later);
    assert_eq!(engine.outbox().names(), vec!["get_buf", "get_buf"]);
    assert_eq!(engine.refetches().attempts(BufId(1)), Some(2));

    engine.refetch_tick(later + Duration::from_secs(3_600));
    assert!(!engine.store().is_populated(BufId(1)));
    assert_eq!(engine.refetches().len(), 0);

    // Patches for the unpopulated buffer are ignored until content arrives.
    engine.handle(event);
    assert_eq!(engine.outbox().sent().len(), 2);
}
