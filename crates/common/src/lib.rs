// bufsync-common: wire protocol, patch codec and content fingerprints shared
// by the bufsync crates.

pub mod content;
pub mod diff;
pub mod path;
pub mod protocol;
