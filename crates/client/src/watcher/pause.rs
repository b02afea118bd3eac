// Echo suppression for writes the engine makes itself.
//
// Saving an inbound buffer to disk would otherwise come straight back
// through the watcher as a local edit and be uploaded again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long a path stays paused after the engine writes it.
pub const SELF_WRITE_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct PauseController {
    paused_until: HashMap<PathBuf, Instant>,
}

impl PauseController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore watcher changes on `path` until `now + duration`.
    pub fn pause_path_for(&mut self, path: &Path, duration: Duration, now: Instant) {
        self.paused_until.insert(path.to_path_buf(), now + duration);
    }

    /// True while `path` is paused. Expired entries are dropped.
    pub fn is_paused(&mut self, path: &Path, now: Instant) -> bool {
        self.paused_until.retain(|_, until| *until > now);
        self.paused_until.contains_key(path)
    }

    pub fn clear(&mut self) {
        self.paused_until.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_expires() {
        let mut pauses = PauseController::new();
        let now = Instant::now();
        let path = Path::new("/w/a.txt");
        pauses.pause_path_for(path, Duration::from_millis(100), now);

        assert!(pauses.is_paused(path, now + Duration::from_millis(99)));
        assert!(!pauses.is_paused(Path::new("/w/b.txt"), now));
        assert!(!pauses.is_paused(path, now + Duration::from_millis(100)));
    }

    #[test]
    fn repause_extends_the_deadline() {
        let mut pauses = PauseController::new();
        let now = Instant::now();
        let path = Path::new("/w/a.txt");
        pauses.pause_path_for(path, Duration::from_millis(100), now);
        pauses.pause_path_for(path, Duration::from_millis(100), now + Duration::from_millis(80));
        assert!(pauses.is_paused(path, now + Duration::from_millis(150)));

        pauses.clear();
        assert!(!pauses.is_paused(path, now));
    }
}
