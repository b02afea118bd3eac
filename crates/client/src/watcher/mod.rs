// File watcher: fsevents/inotify → debounce → engine upload/delete.
// This module handles the first stage: raw FS event detection and filtering.

pub mod debounce;
pub mod pause;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::ignore::is_hidden_name;

/// What happened to a path on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A local filesystem change inside the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Capacity for the internal event channel.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Watches the project root using the OS-native file watcher.
///
/// Events are sent to the returned receiver until the watcher is dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    pub fn start(root: &Path) -> Result<(Self, mpsc::Receiver<LocalChange>)> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize watch root: {}", root.display()))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let root_for_filter = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in translate_event(&event, &root_for_filter) {
                    if tx.blocking_send(change).is_err() {
                        debug!("change channel closed, stopping event dispatch");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "file watcher error");
            }
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch directory: {}", root.display()))?;

        debug!(path = %root.display(), "file watcher started");

        Ok((Self { _watcher: watcher, root }, rx))
    }

    /// The canonicalized root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// True if any component below `root` is a hidden name outside the whitelist.
fn is_hidden_below(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_str().is_some_and(is_hidden_name),
        _ => false,
    })
}

/// Translate a `notify::Event` into local changes, dropping hidden paths and
/// paths outside the root.
fn translate_event(event: &Event, root: &Path) -> Vec<LocalChange> {
    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(modify_kind) => {
            use notify::event::ModifyKind;
            match modify_kind {
                ModifyKind::Metadata(_) => {
                    trace!("skipping metadata-only modify event");
                    return Vec::new();
                }
                _ => ChangeKind::Modified,
            }
        }
        EventKind::Remove(_) => ChangeKind::Removed,
        _ => {
            trace!(kind = ?event.kind, "skipping non-content event");
            return Vec::new();
        }
    };

    event
        .paths
        .iter()
        .filter(|p| {
            if p.starts_with(root) {
                true
            } else {
                warn!(path = %p.display(), "ignoring event outside watch root");
                false
            }
        })
        .filter(|p| !is_hidden_below(p, root))
        .map(|p| LocalChange { kind, path: p.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    fn make_event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        Event { kind, paths, attrs: Default::default() }
    }

    #[test]
    fn create_modify_remove_map_to_change_kinds() {
        let root = PathBuf::from("/workspace");
        let path = PathBuf::from("/workspace/src/main.c");
        let cases = [
            (EventKind::Create(CreateKind::File), ChangeKind::Created),
            (EventKind::Modify(ModifyKind::Data(DataChange::Content)), ChangeKind::Modified),
            (EventKind::Remove(RemoveKind::File), ChangeKind::Removed),
        ];
        for (kind, expected) in cases {
            let changes = translate_event(&make_event(kind, vec![path.clone()]), &root);
            assert_eq!(changes, vec![LocalChange { kind: expected, path: path.clone() }]);
        }
    }

    #[test]
    fn hidden_paths_are_dropped_but_whitelist_passes() {
        let root = PathBuf::from("/workspace");
        let event = make_event(
            EventKind::Create(CreateKind::File),
            vec![
                PathBuf::from("/workspace/.git/index"),
                PathBuf::from("/workspace/src/.cache/x"),
                PathBuf::from("/workspace/.gitignore"),
                PathBuf::from("/workspace/notes.txt"),
            ],
        );
        let paths: Vec<PathBuf> =
            translate_event(&event, &root).into_iter().map(|change| change.path).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/workspace/.gitignore"), PathBuf::from("/workspace/notes.txt")]
        );
    }

    #[test]
    fn hidden_root_itself_does_not_hide_children() {
        let root = PathBuf::from("/home/me/.projects/app");
        let event = make_event(
            EventKind::Create(CreateKind::File),
            vec![PathBuf::from("/home/me/.projects/app/a.txt")],
        );
        assert_eq!(translate_event(&event, &root).len(), 1);
    }

    #[test]
    fn rejects_outside_root() {
        let root = PathBuf::from("/workspace");
        let event =
            make_event(EventKind::Create(CreateKind::File), vec![PathBuf::from("/etc/passwd")]);
        assert!(translate_event(&event, &root).is_empty());
    }

    #[test]
    fn skips_metadata_events() {
        let root = PathBuf::from("/workspace");
        let event = make_event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            vec![PathBuf::from("/workspace/a.txt")],
        );
        assert!(translate_event(&event, &root).is_empty());
    }

    #[test]
    fn renames_are_reported_as_modifications() {
        let root = PathBuf::from("/workspace");
        let event = make_event(
            EventKind::Modify(ModifyKind::Name(notify::event::RenameMode::To)),
            vec![PathBuf::from("/workspace/b.txt")],
        );
        assert_eq!(translate_event(&event, &root)[0].kind, ChangeKind::Modified);
    }

    #[tokio::test]
    async fn watcher_detects_create() {
        let tmp = TempDir::new().unwrap();
        let (watcher, mut rx) = FileWatcher::start(tmp.path()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(tmp.path().join("test.txt"), "hello").unwrap();

        let change = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for create event")
            .expect("channel closed");
        assert!(matches!(change.kind, ChangeKind::Created | ChangeKind::Modified));
        assert!(change.path.ends_with("test.txt"));

        drop(watcher);
    }

    #[test]
    fn watcher_rejects_nonexistent_root() {
        assert!(FileWatcher::start(Path::new("/nonexistent/path/abc123")).is_err());
    }

    #[test]
    fn watcher_exposes_canonical_root() {
        let tmp = TempDir::new().unwrap();
        let (watcher, _rx) = FileWatcher::start(tmp.path()).unwrap();
        assert_eq!(watcher.root(), tmp.path().canonicalize().unwrap());
    }
}
