// In-memory table of workspace buffers, keyed by server id.

use std::collections::HashMap;

use bufsync_common::content::{BufContent, ContentHash, Encoding};
use bufsync_common::protocol::{BufId, BufSummary};

/// One shared buffer as known to this client.
///
/// `content` is `None` until the full text has been loaded (from the server
/// or from a matching local file). Whenever content is present, `md5` is the
/// hash of its canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub id: BufId,
    pub path: String,
    pub content: Option<BufContent>,
    pub md5: ContentHash,
    pub encoding: Encoding,
}

impl Buffer {
    pub fn populated(id: BufId, path: impl Into<String>, content: BufContent) -> Self {
        let md5 = content.md5();
        let encoding = content.encoding();
        Self { id, path: path.into(), content: Some(content), md5, encoding }
    }

    /// A listing entry whose content has not been loaded yet.
    pub fn from_summary(summary: &BufSummary) -> Self {
        Self {
            id: summary.id,
            path: summary.path.clone(),
            content: None,
            md5: summary.md5.clone(),
            encoding: summary.encoding,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.content.is_some()
    }

    /// Text content, when populated with UTF-8 text.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(BufContent::as_text)
    }

    /// Replace the content, keeping hash and encoding in step with it.
    pub fn set_content(&mut self, content: BufContent) {
        self.md5 = content.md5();
        self.encoding = content.encoding();
        self.content = Some(content);
    }

    /// Drop loaded content; later patches are ignored until it is refetched.
    pub fn mark_unpopulated(&mut self) {
        self.content = None;
    }
}

#[derive(Debug, Default)]
pub struct BufferStore {
    bufs: HashMap<BufId, Buffer>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: BufId) -> Option<&Buffer> {
        self.bufs.get(&id)
    }

    pub fn get_mut(&mut self, id: BufId) -> Option<&mut Buffer> {
        self.bufs.get_mut(&id)
    }

    /// Insert or overwrite a buffer, returning the previous entry.
    pub fn insert(&mut self, buffer: Buffer) -> Option<Buffer> {
        self.bufs.insert(buffer.id, buffer)
    }

    pub fn remove(&mut self, id: BufId) -> Option<Buffer> {
        self.bufs.remove(&id)
    }

    /// Reverse lookup by workspace-relative path.
    pub fn by_path(&self, path: &str) -> Option<&Buffer> {
        self.bufs.values().find(|buffer| buffer.path == path)
    }

    pub fn by_path_mut(&mut self, path: &str) -> Option<&mut Buffer> {
        self.bufs.values_mut().find(|buffer| buffer.path == path)
    }

    pub fn is_populated(&self, id: BufId) -> bool {
        self.bufs.get(&id).is_some_and(Buffer::is_populated)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.bufs.values()
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    pub fn clear(&mut self) {
        self.bufs.clear();
    }
}
