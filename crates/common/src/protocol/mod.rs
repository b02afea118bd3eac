// Wire protocol shared by the client crates.

pub mod messages;

pub use messages::{
    BufData, BufId, BufSummary, DeleteBuf, DisconnectEvent, ErrorEvent, HighlightEvent,
    InboundKind, InboundMessage, OutboundMessage, PatchEvent, ProtocolError, Range, RenameBuf,
    RoomInfo, UserEvent, PERM_HIGHLIGHT, PERM_PATCH,
};
