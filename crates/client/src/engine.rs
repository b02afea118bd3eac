// Buffer synchronization engine.
//
// Owns the session context: the buffer store, pending-change queues,
// permissions, outstanding refetches and running scans. All mutation happens
// on the task that owns the engine. Outbound events go to the outbox; inbound
// events arrive through the dispatcher (`dispatch.rs`), and presence events
// are handled in `presence.rs`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use bufsync_common::content::{md5_hex, md5_text, BufContent, ContentHash};
use bufsync_common::diff::Patch;
use bufsync_common::path::{is_shared, normalize_buf_path, to_full_path, to_rel_path};
use bufsync_common::protocol::{
    BufData, BufId, DeleteBuf, DisconnectEvent, ErrorEvent, OutboundMessage, PatchEvent,
    RenameBuf, RoomInfo, UserEvent, PERM_PATCH,
};
use tracing::{debug, error, info, warn};

use crate::buffers::{Buffer, BufferStore};
use crate::config::{GlobalConfig, SyncSettings};
use crate::editor::{Editor, ViewId};
use crate::ignore::excluded_reason;
use crate::marker::{write_marker, WorkspaceUrl};
use crate::outbox::Outbox;
use crate::refetch::RefetchTracker;
use crate::scan::ScanTask;
use crate::watcher::pause::{PauseController, SELF_WRITE_PAUSE};
use crate::watcher::{ChangeKind, LocalChange};

pub struct SyncEngine<O: Outbox, E: Editor> {
    pub(crate) root: PathBuf,
    pub(crate) settings: SyncSettings,
    pub(crate) workspace: Option<WorkspaceUrl>,
    pub(crate) store: BufferStore,
    /// `create_buf` events sent but not yet echoed back, by path.
    pub(crate) pending_creates: HashMap<String, ContentHash>,
    /// Buffers edited locally since the last flush, in arrival order.
    pub(crate) bufs_changed: Vec<BufId>,
    /// Selection changes since the last flush, with their ping flag.
    pub(crate) selection_changed: Vec<(BufId, bool)>,
    pub(crate) perms: Vec<String>,
    pub(crate) read_only: bool,
    pub(crate) follow_mode: bool,
    pub(crate) user_id: Option<u64>,
    pub(crate) refetches: RefetchTracker,
    pub(crate) scans: VecDeque<ScanTask>,
    pub(crate) pauses: PauseController,
    pub(crate) active: bool,
    /// Path to share once the workspace snapshot has arrived.
    pub(crate) pending_share: Option<PathBuf>,
    pub(crate) outbox: O,
    pub(crate) editor: E,
}

impl<O: Outbox, E: Editor> SyncEngine<O, E> {
    pub fn new(root: &Path, config: &GlobalConfig, outbox: O, editor: E) -> Self {
        Self {
            root: root.to_path_buf(),
            settings: config.sync.clone(),
            workspace: None,
            store: BufferStore::new(),
            pending_creates: HashMap::new(),
            bufs_changed: Vec::new(),
            selection_changed: Vec::new(),
            perms: Vec::new(),
            read_only: true,
            follow_mode: false,
            user_id: None,
            refetches: RefetchTracker::new(&config.refetch),
            scans: VecDeque::new(),
            pauses: PauseController::new(),
            active: true,
            pending_share: None,
            outbox,
            editor,
        }
    }

    /// Workspace recorded in the session marker once `room_info` arrives.
    pub fn with_workspace(mut self, url: WorkspaceUrl) -> Self {
        self.workspace = Some(url);
        self
    }

    /// Share `path` (forced, even in sparse mode) right after `room_info`,
    /// once the store knows which buffers already exist.
    pub fn share_after_join(&mut self, path: &Path) {
        self.pending_share = Some(path.to_path_buf());
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn store(&self) -> &BufferStore {
        &self.store
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut O {
        &mut self.outbox
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    pub fn perms(&self) -> &[String] {
        &self.perms
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    /// False once the session has been torn down.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn follow_mode(&self) -> bool {
        self.follow_mode
    }

    /// Set follow mode, or toggle it when `enabled` is `None`.
    pub fn follow(&mut self, enabled: Option<bool>) {
        self.follow_mode = enabled.unwrap_or(!self.follow_mode);
        info!(enabled = self.follow_mode, "follow mode changed");
    }

    pub fn refetches(&self) -> &RefetchTracker {
        &self.refetches
    }

    pub(crate) fn populated(&self, id: BufId) -> Option<&Buffer> {
        self.store.get(id).filter(|buffer| buffer.is_populated())
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Share the file at `path`: `create_buf` for a new path, `set_buf` when
    /// an existing buffer's content changed, nothing when the hash matches.
    pub fn upload(&mut self, path: &Path) -> Result<()> {
        let bytes = fs::read(path).with_context(|| format!("failed to open {}", path.display()))?;
        if bytes.len() as u64 > self.settings.max_file_size {
            warn!(path = %path.display(), size = bytes.len(), "file too large to upload");
            return Ok(());
        }
        let rel_path = to_rel_path(&self.root, path)
            .with_context(|| format!("failed to create buffer for {}", path.display()))?;

        if let Some(existing) = self.store.by_path_mut(&rel_path) {
            if existing.md5 == md5_hex(&bytes) {
                debug!(path = %rel_path, "already shared with the same md5, skipping");
                return Ok(());
            }
            let content = BufContent::from_bytes_as(bytes, existing.encoding);
            info!(buf_id = %existing.id, path = %rel_path, "setting buffer");
            let (buf, encoding) = content.to_wire();
            existing.set_content(content);
            let message = OutboundMessage::SetBuf {
                id: existing.id,
                buf,
                md5: existing.md5.clone(),
                encoding,
            };
            self.outbox.put(message);
            return Ok(());
        }

        let content = BufContent::from_bytes(bytes);
        let md5 = content.md5();
        if self.pending_creates.get(&rel_path) == Some(&md5) {
            debug!(path = %rel_path, "create already sent with the same md5, skipping");
            return Ok(());
        }
        info!(path = %rel_path, "creating buffer");
        self.pending_creates.insert(rel_path.clone(), md5);
        let (buf, encoding) = content.to_wire();
        self.outbox.put(OutboundMessage::CreateBuf { path: rel_path, buf, encoding });
        Ok(())
    }

    /// Start sharing a file or directory tree. The first scan cycle runs
    /// immediately; the runtime drives the rest.
    pub fn create_buf(&mut self, path: &Path, force: bool) {
        if self.settings.sparse_mode && !force {
            debug!(path = %path.display(), "sparse mode enabled, not adding path");
            return;
        }
        if !is_shared(&self.root, path) {
            error!(
                path = %path.display(),
                root = %self.root.display(),
                "not adding path outside the shared root"
            );
            return;
        }
        self.scans.push_back(ScanTask::new(&self.root, path, self.settings.max_file_size));
        self.scan_cycle();
    }

    /// Run one cycle of the oldest scan. Returns true while scans remain.
    pub fn scan_cycle(&mut self) -> bool {
        let Some(task) = self.scans.front_mut() else {
            return false;
        };
        let cycle = task.next_cycle();

        for path in &cycle.uploads {
            if let Err(error) = self.upload(path) {
                error!(path = %path.display(), error = %format!("{error:#}"), "upload failed");
            }
        }

        if cycle.finished {
            self.scans.pop_front();
            if !cycle.too_big.is_empty() {
                let listing: Vec<String> =
                    cycle.too_big.iter().map(|path| path.display().to_string()).collect();
                let message = format!(
                    "{} file(s) were not added because they were larger than {} bytes:\n{}",
                    listing.len(),
                    self.settings.max_file_size,
                    listing.join("\n")
                );
                self.editor.notify_user(&message);
            }
            info!("all done syncing");
        }

        self.has_pending_scans()
    }

    pub fn has_pending_scans(&self) -> bool {
        !self.scans.is_empty()
    }

    /// Ask the server to delete the buffer at `path`, or every buffer under
    /// it when `path` is a directory.
    pub fn delete_buf(&mut self, path: &Path) {
        let full = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };
        if !is_shared(&self.root, &full) {
            error!(
                path = %full.display(),
                root = %self.root.display(),
                "not deleting path outside the shared root"
            );
            return;
        }

        if full.is_dir() {
            let mut entries: Vec<PathBuf> = match fs::read_dir(&full) {
                Ok(entries) => entries.filter_map(|entry| entry.ok().map(|e| e.path())).collect(),
                Err(err) => {
                    error!(path = %full.display(), error = %err, "failed to list directory");
                    return;
                }
            };
            entries.sort();
            for entry in entries {
                let hidden = entry
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with('.'));
                if hidden {
                    if !entry.is_dir() {
                        info!(path = %entry.display(), "not deleting buffer for hidden file");
                    }
                    continue;
                }
                self.delete_buf(&entry);
            }
            return;
        }

        let rel_path = match to_rel_path(&self.root, &full) {
            Ok(rel_path) => rel_path,
            Err(err) => {
                error!(path = %full.display(), error = %err, "cannot resolve buffer path");
                return;
            }
        };
        let Some(buffer) = self.store.by_path(&rel_path) else {
            error!(path = %rel_path, "path is not in this workspace");
            return;
        };
        info!(buf_id = %buffer.id, path = %rel_path, "deleting buffer");
        let id = buffer.id;
        self.outbox.put(OutboundMessage::DeleteBuf { id });
    }

    /// Queue a local edit of `id` for the next flush.
    pub fn buf_changed(&mut self, id: BufId) {
        if !self.bufs_changed.contains(&id) {
            self.bufs_changed.push(id);
        }
    }

    /// Flush pending edits as patches, then pending selections.
    ///
    /// At most one event goes out per view in a flush.
    pub fn push(&mut self) {
        let mut reported: HashSet<ViewId> = HashSet::new();

        for id in std::mem::take(&mut self.bufs_changed) {
            let Some(view) = self.editor.view_id(id) else {
                debug!(buf_id = %id, "no view for changed buffer");
                continue;
            };
            if self.editor.is_loading(id) {
                debug!(buf_id = %id, "view is not ready, ignoring change event");
                continue;
            }
            if self.read_only {
                continue;
            }
            if reported.contains(&view) {
                continue;
            }
            let Some(buffer) = self.store.get_mut(id).filter(|buffer| buffer.is_populated())
            else {
                debug!(buf_id = %id, "no data for buffer yet, not sending patch");
                continue;
            };
            let Some(old_text) = buffer.text() else {
                debug!(buf_id = %id, path = %buffer.path, "binary buffer, not sending patch");
                continue;
            };
            let Some(current) = self.editor.view_text(id) else {
                continue;
            };

            reported.insert(view);
            let patch = Patch::make(old_text, &current);
            if patch.is_empty() {
                debug!(buf_id = %id, "view matches buffer, nothing to send");
                continue;
            }

            let md5_before = buffer.md5.clone();
            buffer.set_content(BufContent::Text(current));
            let message = OutboundMessage::Patch {
                id,
                path: buffer.path.clone(),
                patch: patch.to_text(),
                md5_before,
                md5_after: buffer.md5.clone(),
            };
            debug!(buf_id = %id, hunks = patch.hunks().len(), "sending patch");
            self.outbox.put(message);
        }

        self.flush_selections(&mut reported);
    }

    /// Request the authoritative content of `id`, unless a request is
    /// already outstanding.
    pub fn refetch(&mut self, id: BufId) {
        if !self.refetches.request(id, Instant::now()) {
            debug!(buf_id = %id, "refetch already outstanding");
            return;
        }
        self.outbox.put(OutboundMessage::GetBuf { id });
    }

    /// Re-send expired refetches; give up on buffers out of attempts.
    pub fn refetch_tick(&mut self, now: Instant) {
        let due = self.refetches.due(now);
        for id in due.resend {
            warn!(buf_id = %id, "refetch timed out, asking again");
            self.outbox.put(OutboundMessage::GetBuf { id });
        }
        for id in due.exhausted {
            error!(buf_id = %id, "refetch failed, ignoring buffer until content arrives");
            if let Some(buffer) = self.store.get_mut(id) {
                buffer.mark_unpopulated();
            }
        }
    }

    /// React to a debounced change on disk.
    pub fn local_change(&mut self, change: LocalChange) {
        if !self.active {
            return;
        }
        let path = change.path;
        if self.pauses.is_paused(&path, Instant::now()) {
            debug!(path = %path.display(), "ignoring change caused by our own write");
            return;
        }
        if self.read_only {
            debug!(path = %path.display(), "read-only session, ignoring local change");
            return;
        }

        match change.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                if path.is_dir() {
                    self.create_buf(&path, false);
                    return;
                }
                if !path.is_file() {
                    return;
                }
                if let Some(reason) = excluded_reason(&self.root, &path, false) {
                    debug!(reason = %reason, "not uploading local change");
                    return;
                }
                let tracked = to_rel_path(&self.root, &path)
                    .is_ok_and(|rel_path| self.store.by_path(&rel_path).is_some());
                if self.settings.sparse_mode && !tracked {
                    debug!(path = %path.display(), "sparse mode enabled, not adding path");
                    return;
                }
                if let Err(error) = self.upload(&path) {
                    error!(path = %path.display(), error = %format!("{error:#}"), "upload failed");
                }
            }
            ChangeKind::Removed => self.removed_locally(&path),
        }
    }

    /// The path is gone, so directories are recognized by buffer paths.
    fn removed_locally(&mut self, path: &Path) {
        let Ok(rel_path) = to_rel_path(&self.root, path) else {
            return;
        };
        if self.store.by_path(&rel_path).is_some() {
            self.delete_buf(path);
            return;
        }
        let prefix = format!("{rel_path}/");
        let mut ids: Vec<BufId> = self
            .store
            .iter()
            .filter(|buffer| buffer.path.starts_with(&prefix))
            .map(|buffer| buffer.id)
            .collect();
        ids.sort();
        if ids.is_empty() {
            debug!(path = %rel_path, "removed path was not shared");
        }
        for id in ids {
            info!(buf_id = %id, "deleting buffer under removed directory");
            self.outbox.put(OutboundMessage::DeleteBuf { id });
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────

    pub fn on_create_buf(&mut self, data: BufData) {
        self.on_get_buf(data);
    }

    /// Full content for a buffer: store it, then refresh the view or disk.
    pub fn on_get_buf(&mut self, data: BufData) {
        let id = data.id;
        self.refetches.resolve(id);

        let path = match normalize_buf_path(&data.path) {
            Ok(path) => path,
            Err(err) => {
                error!(buf_id = %id, path = %data.path, error = %err, "invalid buffer path");
                return;
            }
        };
        let content = match BufContent::from_wire(&data.buf, data.encoding) {
            Ok(content) => content,
            Err(err) => {
                error!(buf_id = %id, path = %path, error = %err, "failed to decode buffer");
                return;
            }
        };
        self.pending_creates.remove(&path);
        let buffer = Buffer::populated(id, path, content);
        if let Some(md5) = data.md5.as_ref().filter(|md5| **md5 != buffer.md5) {
            warn!(buf_id = %id, expected = %md5, actual = %buffer.md5, "buffer hash mismatch");
        }
        self.store.insert(buffer);

        if self.editor.view_id(id).is_some() {
            if let Some(buffer) = self.store.get(id) {
                self.editor.update_view(buffer);
            }
        } else if let Err(error) = self.save_buf(id) {
            error!(buf_id = %id, error = %format!("{error:#}"), "failed to save buffer");
        }
    }

    pub fn on_rename_buf(&mut self, event: RenameBuf) {
        let id = event.id;
        if self.store.get(id).is_none() {
            debug!(buf_id = %id, "rename for unknown buffer");
            return;
        }
        let (new_path, new_full, old_full) = match (
            normalize_buf_path(&event.path),
            to_full_path(&self.root, &event.path),
            to_full_path(&self.root, &event.old_path),
        ) {
            (Ok(new_path), Ok(new_full), Ok(old_full)) => (new_path, new_full, old_full),
            (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => {
                error!(buf_id = %id, error = %err, "invalid rename paths");
                return;
            }
        };

        if let Some(parent) = new_full.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                error!(path = %parent.display(), error = %err, "failed to create directory");
            }
        }
        if let Some(buffer) = self.store.get_mut(id) {
            info!(buf_id = %id, from = %event.old_path, to = %new_path, "renaming buffer");
            buffer.path = new_path;
        }

        if self.editor.view_id(id).is_some() {
            self.editor.rename_view(id, &new_full);
            return;
        }
        if !old_full.exists() {
            warn!(buf_id = %id, path = %old_full.display(), "renamed buffer has no local file");
            return;
        }
        let now = Instant::now();
        self.pauses.pause_path_for(&old_full, SELF_WRITE_PAUSE, now);
        self.pauses.pause_path_for(&new_full, SELF_WRITE_PAUSE, now);
        if let Err(err) = fs::rename(&old_full, &new_full) {
            error!(
                from = %old_full.display(),
                to = %new_full.display(),
                error = %err,
                "failed to rename local file"
            );
        }
    }

    /// Apply a remote patch, verifying the hash chain on both ends.
    pub fn on_patch(&mut self, event: PatchEvent) {
        let id = event.id;
        let Some(buffer) = self.populated(id) else {
            debug!(buf_id = %id, "buffer is not populated yet");
            return;
        };
        let path = buffer.path.clone();
        let stored_text = buffer.text().map(str::to_owned);

        if event.patch.is_empty() {
            error!(buf_id = %id, path = %path, "no patches to apply");
            return;
        }
        let patch = match Patch::from_text(&event.patch) {
            Ok(patch) => patch,
            Err(err) => {
                error!(buf_id = %id, path = %path, error = %err, "malformed patch, refetching");
                self.refetch(id);
                return;
            }
        };

        let has_view = self.editor.view_id(id).is_some();
        let Some(mut text) = self.editor.view_text(id).or(stored_text) else {
            warn!(buf_id = %id, path = %path, "patch for a binary buffer ignored");
            return;
        };

        if md5_text(&text) != event.md5_before {
            debug!(buf_id = %id, "hash mismatch, retrying with a trailing newline");
            text.push('\n');
            if md5_text(&text) != event.md5_before {
                text.pop();
                warn!(
                    buf_id = %id,
                    path = %path,
                    ours = %md5_text(&text),
                    theirs = %event.md5_before,
                    "starting hashes diverge"
                );
            }
        }

        let (patched, applied) = patch.apply(&text);
        if applied.iter().any(|ok| !ok) {
            error!(buf_id = %id, path = %path, "failed to patch cleanly, refetching buffer");
            self.refetch(id);
            return;
        }

        let md5_after = md5_text(&patched);
        if md5_after != event.md5_after {
            warn!(
                buf_id = %id,
                path = %path,
                ours = %md5_after,
                expected = %event.md5_after,
                "patched hash mismatch, refetching buffer"
            );
            self.refetch(id);
            return;
        }

        if let Some(buffer) = self.store.get_mut(id) {
            buffer.set_content(BufContent::Text(patched));
        }
        if has_view {
            if let Some(buffer) = self.store.get(id) {
                let patched = buffer.text().unwrap_or_default();
                self.editor.apply_patch(buffer, &patch, patched);
            }
        } else if let Err(error) = self.save_buf(id) {
            error!(buf_id = %id, error = %format!("{error:#}"), "failed to save buffer");
        }
    }

    pub fn on_delete_buf(&mut self, event: DeleteBuf) {
        let id = event.id;
        if self.populated(id).is_none() {
            debug!(buf_id = %id, "buffer is not populated yet");
            return;
        }
        self.store.remove(id);
        self.refetches.resolve(id);

        let full = match to_full_path(&self.root, &event.path) {
            Ok(full) => full,
            Err(err) => {
                error!(buf_id = %id, error = %err, "invalid path in delete_buf");
                return;
            }
        };
        if !self.settings.delete_local_files {
            info!(path = %full.display(), "not deleting local file, delete_local_files is off");
            return;
        }
        self.pauses.pause_path_for(&full, SELF_WRITE_PAUSE, Instant::now());
        if let Err(err) = fs::remove_file(&full) {
            error!(path = %full.display(), error = %err, "failed to delete local file");
            return;
        }
        let by = event.username.as_deref().unwrap_or("the server");
        warn!(path = %full.display(), by, "deleted local file on request");
    }

    /// Session snapshot: permissions plus every buffer without content.
    /// Local files whose hash matches are adopted instead of fetched.
    pub fn on_room_info(&mut self, info: RoomInfo) {
        self.read_only = !info.perms.iter().any(|perm| perm == PERM_PATCH);
        if self.read_only {
            info!("no patch permission, buffers are read-only");
        }
        self.perms = info.perms;
        self.user_id = info.user_id;

        if let Err(err) = fs::create_dir_all(&self.root) {
            error!(path = %self.root.display(), error = %err, "failed to create project root");
        }
        if let Some(url) = &self.workspace {
            if let Err(error) = write_marker(&self.root, url) {
                error!(error = %format!("{error:#}"), "failed to write session marker");
            }
        }

        let mut summaries: Vec<_> = info.bufs.into_values().collect();
        summaries.sort_by_key(|summary| summary.id);

        for summary in summaries {
            let id = summary.id;
            let full = match to_full_path(&self.root, &summary.path) {
                Ok(full) => full,
                Err(err) => {
                    error!(buf_id = %id, path = %summary.path, error = %err, "invalid buffer path");
                    continue;
                }
            };
            if let Some(parent) = full.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    error!(path = %parent.display(), error = %err, "failed to create directory");
                }
            }

            let mut buffer = Buffer::from_summary(&summary);
            if let Ok(path) = normalize_buf_path(&summary.path) {
                buffer.path = path;
            }
            self.store.insert(buffer);

            match fs::read(&full) {
                Ok(bytes) if md5_hex(&bytes) == summary.md5 => {
                    debug!(buf_id = %id, "md5 sums match, not getting buffer");
                    let content = BufContent::from_bytes_as(bytes, summary.encoding);
                    if let Some(buffer) = self.store.get_mut(id) {
                        buffer.set_content(content);
                    }
                }
                Ok(_) if self.settings.get_bufs => self.refetch(id),
                Ok(_) => debug!(buf_id = %id, "local copy differs, get_bufs is off"),
                Err(_) => self.refetch(id),
            }
        }

        if let Some(path) = self.pending_share.take() {
            self.create_buf(&path, true);
        }
    }

    pub fn on_join(&mut self, event: UserEvent) {
        info!(username = %event.username, user_id = event.user_id, "joined the workspace");
    }

    pub fn on_error(&mut self, event: ErrorEvent) {
        let msg = event.msg.as_deref().unwrap_or("unknown error");
        error!(msg, "server error");
    }

    pub fn on_disconnect(&mut self, event: DisconnectEvent) {
        let reason = event.reason.as_deref().unwrap_or("no reason given");
        error!(reason, "disconnected");
        self.teardown();
    }

    /// End the session: drop all state and close the outbox.
    pub fn teardown(&mut self) {
        self.store.clear();
        self.pending_creates.clear();
        self.bufs_changed.clear();
        self.selection_changed.clear();
        self.refetches.clear();
        self.scans.clear();
        self.pauses.clear();
        self.pending_share = None;
        self.active = false;
        self.outbox.close();
        debug!("session torn down");
    }

    /// Write a populated buffer to disk, pausing the watcher for the path.
    fn save_buf(&mut self, id: BufId) -> Result<()> {
        let buffer = self.store.get(id).ok_or_else(|| anyhow!("buffer {id} is not known"))?;
        let content =
            buffer.content.as_ref().ok_or_else(|| anyhow!("buffer {id} has no content"))?;
        let full = to_full_path(&self.root, &buffer.path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        self.pauses.pause_path_for(&full, SELF_WRITE_PAUSE, Instant::now());
        fs::write(&full, content.as_bytes())
            .with_context(|| format!("failed to write {}", full.display()))?;
        debug!(buf_id = %id, path = %full.display(), "saved buffer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::NullEditor;
    use crate::outbox::RecordingOutbox;
    use bufsync_common::content::Encoding;
    use tempfile::TempDir;

    fn engine(root: &Path) -> SyncEngine<RecordingOutbox, NullEditor> {
        SyncEngine::new(root, &GlobalConfig::default(), RecordingOutbox::new(), NullEditor)
    }

    fn text_buf(id: u64, path: &str, text: &str) -> BufData {
        BufData {
            id: BufId(id),
            path: path.into(),
            buf: text.into(),
            encoding: Encoding::Utf8,
            md5: None,
        }
    }

    #[test]
    fn new_session_starts_read_only_and_active() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(tmp.path());
        assert!(engine.is_read_only());
        assert!(engine.is_active());
        assert!(engine.store().is_empty());
    }

    #[test]
    fn get_buf_without_view_saves_to_disk() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine(tmp.path());
        engine.on_get_buf(text_buf(1, "dir/a.txt", "remote"));

        assert_eq!(fs::read_to_string(tmp.path().join("dir/a.txt")).unwrap(), "remote");
        assert!(engine.store().is_populated(BufId(1)));
    }

    #[test]
    fn own_writes_pause_the_watcher() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine(tmp.path());
        engine.read_only = false;
        engine.on_get_buf(text_buf(1, "a.txt", "remote"));

        engine.local_change(LocalChange {
            kind: ChangeKind::Modified,
            path: tmp.path().join("a.txt"),
        });
        assert!(engine.outbox().sent().is_empty());
    }

    #[test]
    fn follow_toggles() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine(tmp.path());
        engine.follow(None);
        assert!(engine.follow_mode());
        engine.follow(Some(true));
        assert!(engine.follow_mode());
        engine.follow(None);
        assert!(!engine.follow_mode());
    }

    #[test]
    fn teardown_clears_state_and_closes_outbox() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine(tmp.path());
        engine.on_get_buf(text_buf(1, "a.txt", "x"));
        engine.buf_changed(BufId(1));
        engine.refetch(BufId(2));

        engine.teardown();

        assert!(engine.store().is_empty());
        assert!(engine.bufs_changed.is_empty());
        assert_eq!(engine.refetches().len(), 0);
        assert!(engine.outbox().is_closed());
        assert!(!engine.is_active());
    }
}
