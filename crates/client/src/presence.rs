// Presence relay: local selections out, collaborator highlights in.

use std::collections::HashSet;

use bufsync_common::protocol::{BufId, HighlightEvent, OutboundMessage, UserEvent, PERM_HIGHLIGHT};
use tracing::{debug, info};

use crate::editor::{Editor, ViewId};
use crate::engine::SyncEngine;
use crate::outbox::Outbox;

impl<O: Outbox, E: Editor> SyncEngine<O, E> {
    /// Queue the local selection of `id` for the next flush. A ping asks
    /// collaborators to jump to the selection.
    pub fn selection_changed(&mut self, id: BufId, ping: bool) {
        match self.selection_changed.iter_mut().find(|(queued, _)| *queued == id) {
            Some((_, queued_ping)) => *queued_ping |= ping,
            None => self.selection_changed.push((id, ping)),
        }
    }

    /// Send queued selections, skipping views that already went out in
    /// this flush. Without the highlight permission the queue is dropped.
    pub(crate) fn flush_selections(&mut self, reported: &mut HashSet<ViewId>) {
        let can_highlight = self.perms.iter().any(|perm| perm == PERM_HIGHLIGHT);

        for (id, ping) in std::mem::take(&mut self.selection_changed) {
            if !can_highlight {
                continue;
            }
            let Some(view) = self.editor.view_id(id) else {
                continue;
            };
            if !reported.insert(view) {
                continue;
            }
            let ranges = self.editor.selections(id);
            self.outbox.put(OutboundMessage::Highlight { id, ranges, ping });
        }
    }

    /// A collaborator's selection. Only a ping (or follow mode) opens a view
    /// that isn't already open.
    pub fn on_highlight(&mut self, event: HighlightEvent) {
        let id = event.id;
        let Some(buffer) = self.store.get(id).filter(|buffer| buffer.is_populated()) else {
            debug!(buf_id = %id, "buffer is not populated yet");
            return;
        };
        let ping = event.ping || self.follow_mode;

        if self.editor.view_id(id).is_none() {
            if !ping {
                return;
            }
            if !self.editor.open_view(buffer) {
                debug!(buf_id = %id, "editor declined to open a view");
                return;
            }
        }

        if ping {
            match event.ranges.first() {
                Some(&(offset, _)) => {
                    let by = event.username.as_deref().unwrap_or("an unknown user");
                    info!(buf_id = %id, by, "summoned");
                    self.editor.focus_view(id);
                    self.editor.set_cursor(id, offset);
                }
                None => debug!(buf_id = %id, "ping without ranges"),
            }
        }

        if self.settings.show_highlights {
            self.editor.highlight(id, event.user_id, &event.ranges);
        }
    }

    pub fn on_part(&mut self, event: UserEvent) {
        info!(username = %event.username, user_id = event.user_id, "left the workspace");
        self.editor.erase_highlights(event.user_id);
    }
}
