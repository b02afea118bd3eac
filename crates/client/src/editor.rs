// Seam between the sync engine and the host editor's views.

use std::path::Path;

use bufsync_common::diff::Patch;
use bufsync_common::protocol::{BufId, Range};
use tracing::{info, warn};

use crate::buffers::Buffer;

/// Identity of an open editor view.
pub type ViewId = u64;

/// Editor operations the engine needs. All methods are keyed by buffer id;
/// a buffer has at most one view.
pub trait Editor {
    /// The open view for a buffer, if any.
    fn view_id(&self, buf_id: BufId) -> Option<ViewId>;

    /// True while the view is still loading its content.
    fn is_loading(&self, buf_id: BufId) -> bool;

    /// Current text of the buffer's view.
    fn view_text(&self, buf_id: BufId) -> Option<String>;

    /// Replace the view's content with the buffer's full content.
    fn update_view(&mut self, buffer: &Buffer);

    /// Apply an already-verified patch to the view. `patched` is the text the
    /// view must end up with.
    fn apply_patch(&mut self, buffer: &Buffer, patch: &Patch, patched: &str);

    fn rename_view(&mut self, buf_id: BufId, new_path: &Path);

    /// Open a view for the buffer. Returns false when the editor declines.
    fn open_view(&mut self, buffer: &Buffer) -> bool;

    fn focus_view(&mut self, buf_id: BufId);

    fn set_cursor(&mut self, buf_id: BufId, offset: usize);

    /// Draw a collaborator's selections.
    fn highlight(&mut self, buf_id: BufId, user_id: u64, ranges: &[Range]);

    /// Remove every highlight drawn for a collaborator.
    fn erase_highlights(&mut self, user_id: u64);

    /// Local selections in the buffer's view.
    fn selections(&self, buf_id: BufId) -> Vec<Range>;

    /// Surface a message to the user.
    fn notify_user(&mut self, message: &str);
}

/// Editor without views: every buffer lives on disk only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEditor;

impl Editor for NullEditor {
    fn view_id(&self, _buf_id: BufId) -> Option<ViewId> {
        None
    }

    fn is_loading(&self, _buf_id: BufId) -> bool {
        false
    }

    fn view_text(&self, _buf_id: BufId) -> Option<String> {
        None
    }

    fn update_view(&mut self, _buffer: &Buffer) {}

    fn apply_patch(&mut self, _buffer: &Buffer, _patch: &Patch, _patched: &str) {}

    fn rename_view(&mut self, _buf_id: BufId, _new_path: &Path) {}

    fn open_view(&mut self, _buffer: &Buffer) -> bool {
        false
    }

    fn focus_view(&mut self, _buf_id: BufId) {}

    fn set_cursor(&mut self, _buf_id: BufId, _offset: usize) {}

    fn highlight(&mut self, _buf_id: BufId, _user_id: u64, _ranges: &[Range]) {}

    fn erase_highlights(&mut self, _user_id: u64) {}

    fn selections(&self, _buf_id: BufId) -> Vec<Range> {
        Vec::new()
    }

    fn notify_user(&mut self, message: &str) {
        if message.is_empty() {
            warn!("empty user notification");
            return;
        }
        info!(message, "user notification");
    }
}
