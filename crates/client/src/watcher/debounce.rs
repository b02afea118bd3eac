// Coalesces bursts of local changes on the same path within a window
// (default 100ms, range 50–500ms). The last change kind wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{ChangeKind, LocalChange};

const DEFAULT_DEBOUNCE_MS: u64 = 100;
const MIN_DEBOUNCE_MS: u64 = 50;
const MAX_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Window in milliseconds, clamped to 50..=500.
    pub fn with_millis(ms: u64) -> Self {
        let clamped = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Self { window: Duration::from_millis(clamped) }
    }
}

#[derive(Debug)]
struct PendingChange {
    kind: ChangeKind,
    last_seen: Instant,
}

/// Call `push()` for each incoming change, then `drain_ready()` periodically
/// to collect changes whose window has elapsed.
#[derive(Debug)]
pub struct Debouncer {
    config: DebounceConfig,
    pending: HashMap<PathBuf, PendingChange>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: HashMap::new() }
    }

    /// Record a change. A pending change on the same path is replaced and its
    /// timer restarts.
    pub fn push(&mut self, change: LocalChange) {
        self.push_at(change, Instant::now());
    }

    pub(crate) fn push_at(&mut self, change: LocalChange, now: Instant) {
        self.pending.insert(change.path, PendingChange { kind: change.kind, last_seen: now });
    }

    /// Drain every change whose window has elapsed, sorted by path.
    pub fn drain_ready(&mut self) -> Vec<LocalChange> {
        self.drain_ready_at(Instant::now())
    }

    pub(crate) fn drain_ready_at(&mut self, now: Instant) -> Vec<LocalChange> {
        let window = self.config.window;
        let mut ready = Vec::new();

        self.pending.retain(|path, pending| {
            if now.duration_since(pending.last_seen) >= window {
                ready.push(LocalChange { kind: pending.kind, path: path.clone() });
                false
            } else {
                true
            }
        });

        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }

    /// Number of changes still waiting in the window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// When the earliest pending change becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.last_seen + self.config.window).min()
    }
}
