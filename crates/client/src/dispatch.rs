// Routes named inbound events to the engine's handlers.

use bufsync_common::protocol::{InboundKind, InboundMessage, ProtocolError};
use serde_json::Value;
use tracing::{debug, error};

use crate::editor::Editor;
use crate::engine::SyncEngine;
use crate::outbox::Outbox;

/// Events that only make sense once the buffer's content is loaded.
fn requires_populated(kind: InboundKind) -> bool {
    matches!(kind, InboundKind::Patch | InboundKind::DeleteBuf | InboundKind::Highlight)
}

impl<O: Outbox, E: Editor> SyncEngine<O, E> {
    /// Decode and route one raw inbound event.
    pub fn handle(&mut self, value: Value) {
        match InboundMessage::parse(value) {
            Ok(message) => self.handle_message(message),
            Err(ProtocolError::MissingName) => error!("inbound event has no name"),
            Err(ProtocolError::UnknownName(name)) => debug!(name = %name, "dropping unknown event"),
            Err(error @ ProtocolError::InvalidPayload { .. }) => {
                error!(error = %error, "malformed inbound event");
            }
        }
    }

    pub fn handle_message(&mut self, message: InboundMessage) {
        if !self.active {
            debug!(name = message.kind().name(), "session ended, dropping event");
            return;
        }
        if requires_populated(message.kind()) {
            if let Some(id) = message.buf_id() {
                if !self.store.is_populated(id) {
                    debug!(buf_id = %id, name = message.kind().name(), "buffer is not populated");
                    return;
                }
            }
        }

        match message {
            InboundMessage::CreateBuf(data) => self.on_create_buf(data),
            InboundMessage::GetBuf(data) => self.on_get_buf(data),
            InboundMessage::RenameBuf(event) => self.on_rename_buf(event),
            InboundMessage::RoomInfo(info) => self.on_room_info(info),
            InboundMessage::Join(event) => self.on_join(event),
            InboundMessage::Part(event) => self.on_part(event),
            InboundMessage::Patch(event) => self.on_patch(event),
            InboundMessage::DeleteBuf(event) => self.on_delete_buf(event),
            InboundMessage::Highlight(event) => self.on_highlight(event),
            InboundMessage::Error(event) => self.on_error(event),
            InboundMessage::Disconnect(event) => self.on_disconnect(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::config::GlobalConfig;
    use crate::editor::NullEditor;
    use crate::outbox::RecordingOutbox;

    fn engine(root: &Path) -> SyncEngine<RecordingOutbox, NullEditor> {
        SyncEngine::new(root, &GlobalConfig::default(), RecordingOutbox::new(), NullEditor)
    }

    #[test]
    fn populated_guard_covers_patch_delete_and_highlight() {
        assert!(requires_populated(InboundKind::Patch));
        assert!(requires_populated(InboundKind::DeleteBuf));
        assert!(requires_populated(InboundKind::Highlight));
        assert!(!requires_populated(InboundKind::GetBuf));
        assert!(!requires_populated(InboundKind::RenameBuf));
    }

    #[test]
    fn unnamed_unknown_and_malformed_events_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine(tmp.path());
        engine.handle(json!({"id": 1}));
        engine.handle(json!({"name": "msg", "data": "hello"}));
        engine.handle(json!({"name": "get_buf", "id": "not a number"}));
        assert!(engine.store().is_empty());
        assert!(engine.outbox().sent().is_empty());
    }

    #[test]
    fn patch_for_unknown_buffer_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine(tmp.path());
        engine.handle(json!({
            "name": "patch",
            "id": 9,
            "patch": "@@ -1 +1 @@\n-a\n+b\n",
            "md5_before": "x",
            "md5_after": "y"
        }));
        assert!(engine.outbox().sent().is_empty());
    }

    #[test]
    fn get_buf_routes_to_the_store() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine(tmp.path());
        engine.handle(json!({"name": "get_buf", "id": 3, "path": "a.txt", "buf": "hi"}));
        assert!(engine.store().is_populated(bufsync_common::protocol::BufId(3)));
    }

    #[test]
    fn events_after_disconnect_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine(tmp.path());
        engine.handle(json!({"name": "disconnect", "reason": "bye"}));
        assert!(!engine.is_active());

        engine.handle(json!({"name": "get_buf", "id": 3, "path": "a.txt", "buf": "hi"}));
        assert!(engine.store().is_empty());
    }
}
