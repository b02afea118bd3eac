// bufsync client library: buffer store, scanner, sync engine and session
// runtime for a collaborative editing workspace.

pub mod buffers;
pub mod config;
pub mod dispatch;
pub mod editor;
pub mod engine;
pub mod ignore;
pub mod marker;
pub mod outbox;
pub mod presence;
pub mod refetch;
pub mod scan;
pub mod session;
pub mod watcher;
