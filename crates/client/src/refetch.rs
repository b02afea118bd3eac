// Bookkeeping for outstanding full-buffer refetches.
//
// A refetch is the only request/response exchange in the protocol: a
// `get_buf` goes out and the content comes back later as an inbound
// `get_buf`. At most one request per buffer is outstanding; expired requests
// are re-sent with backoff until the attempt budget runs out.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bufsync_common::protocol::BufId;

use crate::config::RefetchSettings;
use crate::outbox::backoff_delay;

#[derive(Debug, Clone, Copy)]
struct Outstanding {
    attempts: u32,
    deadline: Instant,
}

/// Refetches that came due on a tick.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RefetchDue {
    /// Buffers whose request should be sent again.
    pub resend: Vec<BufId>,
    /// Buffers that used up every attempt.
    pub exhausted: Vec<BufId>,
}

#[derive(Debug)]
pub struct RefetchTracker {
    outstanding: HashMap<BufId, Outstanding>,
    timeout: Duration,
    max_attempts: u32,
}

impl RefetchTracker {
    pub fn new(settings: &RefetchSettings) -> Self {
        Self {
            outstanding: HashMap::new(),
            timeout: settings.timeout(),
            max_attempts: settings.max_attempts.max(1),
        }
    }

    /// Record a new request. Returns false when one is already outstanding
    /// and nothing should be sent.
    pub fn request(&mut self, id: BufId, now: Instant) -> bool {
        if self.outstanding.contains_key(&id) {
            return false;
        }
        self.outstanding.insert(id, Outstanding { attempts: 1, deadline: now + self.timeout });
        true
    }

    /// Content for the buffer arrived. Returns true if a request was pending.
    pub fn resolve(&mut self, id: BufId) -> bool {
        self.outstanding.remove(&id).is_some()
    }

    /// Collect expired requests, rescheduling the ones with attempts left.
    pub fn due(&mut self, now: Instant) -> RefetchDue {
        let mut due = RefetchDue::default();
        let timeout = self.timeout;
        let max_attempts = self.max_attempts;

        self.outstanding.retain(|id, pending| {
            if pending.deadline > now {
                return true;
            }
            if pending.attempts >= max_attempts {
                due.exhausted.push(*id);
                return false;
            }
            let retry = pending.attempts;
            pending.attempts += 1;
            pending.deadline = now + timeout + backoff_delay(retry - 1);
            due.resend.push(*id);
            true
        });

        due.resend.sort();
        due.exhausted.sort();
        due
    }

    pub fn is_outstanding(&self, id: BufId) -> bool {
        self.outstanding.contains_key(&id)
    }

    pub fn attempts(&self, id: BufId) -> Option<u32> {
        self.outstanding.get(&id).map(|pending| pending.attempts)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn clear(&mut self) {
        self.outstanding.clear();
    }
}
