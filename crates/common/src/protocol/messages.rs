// Named JSON events exchanged with the workspace server.
//
// Every event is a JSON object whose `name` field selects the payload shape.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::content::{ContentHash, Encoding};

/// Server-assigned buffer identifier, stable for the buffer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufId(pub u64);

impl fmt::Display for BufId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A selection as `[start, end]` character offsets.
pub type Range = (usize, usize);

/// Permission that allows sending patches.
pub const PERM_PATCH: &str = "patch";
/// Permission that allows broadcasting highlights.
pub const PERM_HIGHLIGHT: &str = "highlight";

// ── Outbound ────────────────────────────────────────────────────────

/// Events sent by this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// New buffer with full content.
    CreateBuf { path: String, buf: String, encoding: Encoding },
    /// Full-content overwrite of an existing buffer.
    SetBuf { id: BufId, buf: String, md5: ContentHash, encoding: Encoding },
    DeleteBuf { id: BufId },
    /// Incremental edit bracketed by content hashes.
    Patch {
        id: BufId,
        path: String,
        patch: String,
        md5_before: ContentHash,
        md5_after: ContentHash,
    },
    Highlight { id: BufId, ranges: Vec<Range>, ping: bool },
    /// Request the authoritative full content of a buffer.
    GetBuf { id: BufId },
}

impl OutboundMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateBuf { .. } => "create_buf",
            Self::SetBuf { .. } => "set_buf",
            Self::DeleteBuf { .. } => "delete_buf",
            Self::Patch { .. } => "patch",
            Self::Highlight { .. } => "highlight",
            Self::GetBuf { .. } => "get_buf",
        }
    }
}

// ── Inbound payloads ────────────────────────────────────────────────

/// Full buffer content, carried by `create_buf` and `get_buf`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufData {
    pub id: BufId,
    pub path: String,
    pub buf: String,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<ContentHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameBuf {
    pub id: BufId,
    pub path: String,
    pub old_path: String,
}

/// Buffer listing entry in the `room_info` snapshot (no content).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufSummary {
    pub id: BufId,
    pub path: String,
    pub md5: ContentHash,
    #[serde(default)]
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomInfo {
    #[serde(default)]
    pub perms: Vec<String>,
    /// Keyed by the buffer id rendered as a string (JSON object keys).
    #[serde(default)]
    pub bufs: HashMap<String, BufSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEvent {
    pub username: String,
    #[serde(default)]
    pub user_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchEvent {
    pub id: BufId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub patch: String,
    pub md5_before: ContentHash,
    pub md5_after: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteBuf {
    pub id: BufId,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HighlightEvent {
    pub id: BufId,
    #[serde(default)]
    pub ranges: Vec<Range>,
    #[serde(default)]
    pub ping: bool,
    #[serde(default)]
    pub user_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEvent {
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisconnectEvent {
    #[serde(default)]
    pub reason: Option<String>,
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Names of the inbound events this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    CreateBuf,
    GetBuf,
    RenameBuf,
    RoomInfo,
    Join,
    Part,
    Patch,
    DeleteBuf,
    Highlight,
    Error,
    Disconnect,
}

impl InboundKind {
    pub const ALL: [InboundKind; 11] = [
        Self::CreateBuf,
        Self::GetBuf,
        Self::RenameBuf,
        Self::RoomInfo,
        Self::Join,
        Self::Part,
        Self::Patch,
        Self::DeleteBuf,
        Self::Highlight,
        Self::Error,
        Self::Disconnect,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateBuf => "create_buf",
            Self::GetBuf => "get_buf",
            Self::RenameBuf => "rename_buf",
            Self::RoomInfo => "room_info",
            Self::Join => "join",
            Self::Part => "part",
            Self::Patch => "patch",
            Self::DeleteBuf => "delete_buf",
            Self::Highlight => "highlight",
            Self::Error => "error",
            Self::Disconnect => "disconnect",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Events received from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum InboundMessage {
    CreateBuf(BufData),
    GetBuf(BufData),
    RenameBuf(RenameBuf),
    RoomInfo(RoomInfo),
    Join(UserEvent),
    Part(UserEvent),
    Patch(PatchEvent),
    DeleteBuf(DeleteBuf),
    Highlight(HighlightEvent),
    Error(ErrorEvent),
    Disconnect(DisconnectEvent),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message has no name")]
    MissingName,

    #[error("unknown message name `{0}`")]
    UnknownName(String),

    #[error("invalid `{name}` payload: {source}")]
    InvalidPayload {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl InboundMessage {
    /// Decode a raw JSON event, separating "no name", "unknown name" and
    /// "known name with a bad payload".
    pub fn parse(value: Value) -> Result<Self, ProtocolError> {
        let name = value.get("name").and_then(Value::as_str).ok_or(ProtocolError::MissingName)?;
        let kind =
            InboundKind::from_name(name).ok_or_else(|| ProtocolError::UnknownName(name.into()))?;
        serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidPayload { name: kind.name(), source })
    }

    pub fn kind(&self) -> InboundKind {
        match self {
            Self::CreateBuf(_) => InboundKind::CreateBuf,
            Self::GetBuf(_) => InboundKind::GetBuf,
            Self::RenameBuf(_) => InboundKind::RenameBuf,
            Self::RoomInfo(_) => InboundKind::RoomInfo,
            Self::Join(_) => InboundKind::Join,
            Self::Part(_) => InboundKind::Part,
            Self::Patch(_) => InboundKind::Patch,
            Self::DeleteBuf(_) => InboundKind::DeleteBuf,
            Self::Highlight(_) => InboundKind::Highlight,
            Self::Error(_) => InboundKind::Error,
            Self::Disconnect(_) => InboundKind::Disconnect,
        }
    }

    /// The buffer this event targets, if any.
    pub fn buf_id(&self) -> Option<BufId> {
        match self {
            Self::CreateBuf(data) | Self::GetBuf(data) => Some(data.id),
            Self::RenameBuf(event) => Some(event.id),
            Self::Patch(event) => Some(event.id),
            Self::DeleteBuf(event) => Some(event.id),
            Self::Highlight(event) => Some(event.id),
            Self::RoomInfo(_)
            | Self::Join(_)
            | Self::Part(_)
            | Self::Error(_)
            | Self::Disconnect(_) => None,
        }
    }
}
