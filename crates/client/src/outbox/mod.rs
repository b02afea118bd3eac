// Outbound event queue between the engine and the transport.
//
// The engine never writes to the network directly; it puts events into an
// outbox and the session runtime forwards them in order.

use std::time::Duration;

use bufsync_common::protocol::OutboundMessage;
use tokio::sync::mpsc;
use tracing::debug;

const BASE_DELAY_MS: u64 = 250;
const MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff for retry number `attempt` (0-based): 250 ms doubling,
/// capped at 30 s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.min(7);
    let delay_ms = BASE_DELAY_MS.saturating_mul(1u64 << exp).min(MAX_DELAY_MS);
    Duration::from_millis(delay_ms)
}

pub trait Outbox {
    fn put(&mut self, message: OutboundMessage);

    /// Stop accepting events; later puts are dropped.
    fn close(&mut self);
}

/// Outbox feeding a tokio channel drained by the transport writer.
#[derive(Debug)]
pub struct ChannelOutbox {
    tx: Option<mpsc::UnboundedSender<OutboundMessage>>,
}

impl ChannelOutbox {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, mpsc::UnboundedSender::is_closed)
    }
}

impl Outbox for ChannelOutbox {
    fn put(&mut self, message: OutboundMessage) {
        let Some(tx) = self.tx.as_ref() else {
            debug!(name = message.name(), "outbox closed, dropping event");
            return;
        };
        if let Err(error) = tx.send(message) {
            debug!(name = error.0.name(), "transport gone, dropping event");
            self.tx = None;
        }
    }

    fn close(&mut self) {
        self.tx = None;
    }
}

/// Outbox that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    sent: Vec<OutboundMessage>,
    closed: bool,
}

impl RecordingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[OutboundMessage] {
        &self.sent
    }

    /// Remove and return everything recorded so far.
    pub fn take(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.sent)
    }

    /// Event names in send order.
    pub fn names(&self) -> Vec<&'static str> {
        self.sent.iter().map(OutboundMessage::name).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Outbox for RecordingOutbox {
    fn put(&mut self, message: OutboundMessage) {
        if self.closed {
            debug!(name = message.name(), "outbox closed, dropping event");
            return;
        }
        self.sent.push(message);
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufsync_common::protocol::BufId;

    #[test]
    fn backoff_delay_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(250));
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(3), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(7), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(100), Duration::from_millis(30_000));
    }

    #[test]
    fn recording_outbox_keeps_order_and_honors_close() {
        let mut outbox = RecordingOutbox::new();
        outbox.put(OutboundMessage::GetBuf { id: BufId(1) });
        outbox.put(OutboundMessage::DeleteBuf { id: BufId(2) });
        assert_eq!(outbox.names(), vec!["get_buf", "delete_buf"]);

        outbox.close();
        outbox.put(OutboundMessage::GetBuf { id: BufId(3) });
        assert_eq!(outbox.sent().len(), 2);
        assert!(outbox.is_closed());
        assert_eq!(outbox.take().len(), 2);
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn channel_outbox_forwards_until_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut outbox = ChannelOutbox::new(tx);

        outbox.put(OutboundMessage::GetBuf { id: BufId(7) });
        assert_eq!(rx.recv().await, Some(OutboundMessage::GetBuf { id: BufId(7) }));

        outbox.close();
        assert!(outbox.is_closed());
        outbox.put(OutboundMessage::GetBuf { id: BufId(8) });
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn channel_outbox_notices_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut outbox = ChannelOutbox::new(tx);
        drop(rx);
        outbox.put(OutboundMessage::GetBuf { id: BufId(1) });
        assert!(outbox.is_closed());
    }
}
