// Resumable, rate-limited workspace scan.
//
// A `ScanTask` holds two work queues: paths still to expand and regular
// files ready for upload. Each cycle expands queued paths until a quota of
// files has been found, then hands out a bounded batch of uploads. The
// session runtime drives further cycles from a timer until the task drains.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bufsync_common::path::is_shared;
use tracing::{debug, error, info};

use crate::ignore::{excluded_reason, is_hidden_name, IgnoreContext};

/// Files discovered per cycle before expansion pauses.
pub const SCAN_QUOTA: usize = 10;
/// Maximum uploads handed out per cycle.
pub const UPLOADS_PER_CYCLE: usize = 10;
/// Files above this size are skipped and reported once the scan ends.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// A path waiting to be expanded, with the ignore context it was found in.
/// Only the scan's starting path has no context.
#[derive(Debug)]
struct PendingPath {
    context: Option<Arc<IgnoreContext>>,
    path: PathBuf,
}

/// Result of one scan cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanCycle {
    /// Files to upload now, in discovery order.
    pub uploads: Vec<PathBuf>,
    /// True once both queues are empty.
    pub finished: bool,
    /// Oversized files, reported only in the finishing cycle.
    pub too_big: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct ScanTask {
    root: PathBuf,
    pending: VecDeque<PendingPath>,
    files: VecDeque<PathBuf>,
    too_big: Vec<PathBuf>,
    max_file_size: u64,
}

impl ScanTask {
    /// Start a scan of `start`, a directory or file under the workspace `root`.
    pub fn new(root: &Path, start: &Path, max_file_size: u64) -> Self {
        let mut task = Self {
            root: root.to_path_buf(),
            pending: VecDeque::new(),
            files: VecDeque::new(),
            too_big: Vec::new(),
            max_file_size,
        };

        if start == root {
            task.pending.push_back(PendingPath { context: None, path: start.to_path_buf() });
            return task;
        }

        let is_dir = start.is_dir();
        if let Some(reason) = excluded_reason(root, start, is_dir) {
            info!(path = %start.display(), reason = %reason, "not scanning excluded path");
            return task;
        }
        let parent = start.parent().unwrap_or(root);
        task.pending.push_back(PendingPath {
            context: Some(IgnoreContext::for_dir(root, parent)),
            path: start.to_path_buf(),
        });
        task
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty() && self.files.is_empty()
    }

    /// Run one cycle: expand until the quota is met, then release uploads.
    pub fn next_cycle(&mut self) -> ScanCycle {
        let mut quota = SCAN_QUOTA;
        while quota > 0 {
            let Some(next) = self.pending.pop_front() else {
                break;
            };
            let found = self.expand(next);
            quota = quota.saturating_sub(found);
        }

        let batch = UPLOADS_PER_CYCLE.min(self.files.len());
        let uploads: Vec<PathBuf> = self.files.drain(..batch).collect();
        let finished = self.is_done();
        let too_big = if finished { std::mem::take(&mut self.too_big) } else { Vec::new() };

        ScanCycle { uploads, finished, too_big }
    }

    /// Expand one queued path; returns the number of regular files found.
    fn expand(&mut self, pending: PendingPath) -> usize {
        let path = pending.path;

        if !is_shared(&self.root, &path) {
            error!(
                path = %path.display(),
                root = %self.root.display(),
                "skipping path outside the shared root"
            );
            return 0;
        }

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to stat path");
                return 0;
            }
        };
        if metadata.file_type().is_symlink() {
            error!(path = %path.display(), "skipping symlink");
            return 0;
        }
        if metadata.is_file() {
            self.classify_file(path, metadata.len());
            return 1;
        }
        if !metadata.is_dir() {
            return 0;
        }

        debug!(path = %path.display(), "scanning directory");
        let context = Arc::new(match &pending.context {
            Some(parent) => IgnoreContext::child(parent, &path),
            None => IgnoreContext::root(&path),
        });

        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to list directory");
                return 0;
            }
        };
        let mut children: Vec<PathBuf> =
            entries.filter_map(|entry| entry.ok()).map(|entry| entry.path()).collect();
        children.sort();

        let mut found = 0;
        for child in children {
            let name = child.file_name().and_then(|name| name.to_str()).unwrap_or_default();
            if is_hidden_name(name) {
                debug!(path = %child.display(), "skipping hidden path");
                continue;
            }

            let metadata = match fs::symlink_metadata(&child) {
                Ok(metadata) => metadata,
                Err(err) => {
                    error!(path = %child.display(), error = %err, "failed to stat path");
                    continue;
                }
            };
            if metadata.file_type().is_symlink() {
                error!(path = %child.display(), "skipping symlink");
                continue;
            }

            let is_dir = metadata.is_dir();
            if let Some(reason) = context.is_ignored(&child, is_dir) {
                info!(reason = %reason, "not creating buffer");
                continue;
            }

            if is_dir {
                self.pending
                    .push_back(PendingPath { context: Some(Arc::clone(&context)), path: child });
            } else if metadata.is_file() {
                self.classify_file(child, metadata.len());
                found += 1;
            }
        }
        found
    }

    fn classify_file(&mut self, path: PathBuf, size: u64) {
        if size > self.max_file_size {
            self.too_big.push(path);
        } else {
            self.files.push_back(path);
        }
    }
}
