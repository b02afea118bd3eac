// Session runtime: the single task that owns the engine.
//
// Inbound events, debounced local changes, the flush interval and the scan
// timer all feed one `select!` loop, so the engine is never shared.
// `serve_lines` bridges newline-delimited JSON streams to that loop.

use std::path::PathBuf;
use std::time::Instant as StdInstant;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use bufsync_common::protocol::OutboundMessage;

use crate::config::GlobalConfig;
use crate::editor::{Editor, NullEditor};
use crate::engine::SyncEngine;
use crate::marker::WorkspaceUrl;
use crate::outbox::{ChannelOutbox, Outbox};
use crate::watcher::debounce::{DebounceConfig, Debouncer};
use crate::watcher::{FileWatcher, LocalChange};

/// Capacity of the inbound event channel.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Why a session loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Shutdown,
    InboundClosed,
    Disconnected,
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Recorded in the `.bufsync` marker when the workspace joins.
    pub workspace: Option<WorkspaceUrl>,
    /// Share the whole project root once `room_info` arrives.
    pub share: bool,
    /// Upload local file changes as they happen.
    pub watch: bool,
    pub debounce: DebounceConfig,
}

/// Drive `engine` until shutdown, the inbound channel closes, or the server
/// disconnects. A shutdown tears the session down.
pub async fn run_session<O: Outbox, E: Editor>(
    engine: &mut SyncEngine<O, E>,
    mut inbound_rx: mpsc::Receiver<Value>,
    mut local_rx: Option<mpsc::Receiver<LocalChange>>,
    debounce: DebounceConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> SessionEnd {
    let mut debouncer = Debouncer::new(debounce);
    let mut flush = tokio::time::interval(engine.settings().flush_interval());
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let scan_delay = engine.settings().scan_delay();
    let scan_timer = tokio::time::sleep(scan_delay);
    tokio::pin!(scan_timer);
    let mut scan_armed = false;

    info!(root = %engine.root().display(), "session started");

    loop {
        if !engine.is_active() {
            info!("session disconnected");
            return SessionEnd::Disconnected;
        }
        if engine.has_pending_scans() && !scan_armed {
            scan_timer.as_mut().reset(Instant::now() + scan_delay);
            scan_armed = true;
        }

        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("session shutting down");
                engine.teardown();
                return SessionEnd::Shutdown;
            }

            maybe_value = inbound_rx.recv() => {
                match maybe_value {
                    Some(value) => engine.handle(value),
                    None => {
                        info!("inbound channel closed, session exiting");
                        return SessionEnd::InboundClosed;
                    }
                }
            }

            maybe_change = recv_local(&mut local_rx) => {
                match maybe_change {
                    Some(change) => {
                        trace!(path = %change.path.display(), kind = ?change.kind, "local change");
                        debouncer.push(change);
                    }
                    None => {
                        debug!("local change channel closed");
                        local_rx = None;
                    }
                }
            }

            _ = &mut scan_timer, if scan_armed => {
                scan_armed = false;
                engine.scan_cycle();
            }

            _ = flush.tick() => {
                for change in debouncer.drain_ready() {
                    engine.local_change(change);
                }
                engine.push();
                engine.refetch_tick(StdInstant::now());
            }
        }
    }
}

async fn recv_local(rx: &mut Option<mpsc::Receiver<LocalChange>>) -> Option<LocalChange> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run a session over newline-delimited JSON: events are read from `reader`
/// and outbound events written to `writer`, one object per line.
pub async fn serve_lines<R, W, E>(
    reader: R,
    writer: W,
    root: PathBuf,
    config: GlobalConfig,
    editor: E,
    options: SessionOptions,
    shutdown: broadcast::Receiver<()>,
) -> Result<SessionEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    E: Editor,
{
    let root = root
        .canonicalize()
        .with_context(|| format!("failed to canonicalize project root: {}", root.display()))?;

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

    let mut engine = SyncEngine::new(&root, &config, ChannelOutbox::new(out_tx), editor);
    if let Some(url) = options.workspace.clone() {
        engine = engine.with_workspace(url);
    }
    if options.share {
        engine.share_after_join(&root);
    }

    let (_watcher, local_rx) = if options.watch {
        let (watcher, rx) = FileWatcher::start(&root)?;
        (Some(watcher), Some(rx))
    } else {
        (None, None)
    };

    let driven = async {
        let end = {
            let inbound = read_lines(reader, inbound_tx);
            tokio::pin!(inbound);
            let session =
                run_session(&mut engine, inbound_rx, local_rx, options.debounce, shutdown);
            tokio::pin!(session);

            let mut reading = true;
            loop {
                tokio::select! {
                    end = &mut session => break end,
                    result = &mut inbound, if reading => {
                        reading = false;
                        if let Err(error) = result {
                            warn!(?error, "inbound stream failed");
                        }
                    }
                }
            }
        };
        if engine.is_active() {
            engine.teardown();
        }
        end
    };

    let (end, written) = tokio::join!(driven, write_lines(writer, out_rx));
    written?;
    Ok(end)
}

/// `serve_lines` over the process's stdin and stdout.
pub async fn serve_stdio(
    root: PathBuf,
    config: GlobalConfig,
    options: SessionOptions,
    shutdown: broadcast::Receiver<()>,
) -> Result<SessionEnd> {
    let (stdin, stdout) = (tokio::io::stdin(), tokio::io::stdout());
    serve_lines(stdin, stdout, root, config, NullEditor, options, shutdown).await
}

async fn read_lines<R>(reader: R, inbound_tx: mpsc::Sender<Value>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);

    loop {
        let mut line = Vec::new();
        let bytes_read =
            reader.read_until(b'\n', &mut line).await.context("failed to read inbound event")?;
        if bytes_read == 0 {
            return Ok(());
        }

        trim_line_endings(&mut line);
        if line.iter().all(|byte| byte.is_ascii_whitespace()) {
            continue;
        }

        let value: Value = match serde_json::from_slice(&line) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "dropping inbound line that is not JSON");
                continue;
            }
        };
        if inbound_tx.send(value).await.is_err() {
            return Ok(());
        }
    }
}

async fn write_lines<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
) -> Result<()> {
    while let Some(message) = out_rx.recv().await {
        let mut encoded = serde_json::to_vec(&message)
            .with_context(|| format!("failed to serialize `{}` event", message.name()))?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await.context("failed to write outbound event")?;
        writer.flush().await.context("failed to flush outbound event")?;
    }
    Ok(())
}

fn trim_line_endings(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_crlf_and_lf() {
        let mut line = b"{}\r\n".to_vec();
        trim_line_endings(&mut line);
        assert_eq!(line, b"{}");

        let mut line = b"{}".to_vec();
        trim_line_endings(&mut line);
        assert_eq!(line, b"{}");
    }

    #[tokio::test]
    async fn read_lines_skips_blank_and_invalid_lines() {
        let input: &[u8] = b"\n{\"name\":\"join\",\"username\":\"ana\"}\r\nnot json\n\n{\"a\":1}";
        let (tx, mut rx) = mpsc::channel(8);
        read_lines(input, tx).await.unwrap();

        assert_eq!(rx.recv().await.unwrap()["name"], "join");
        assert_eq!(rx.recv().await.unwrap()["a"], 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn write_lines_emits_one_object_per_line() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(OutboundMessage::GetBuf { id: bufsync_common::protocol::BufId(1) }).unwrap();
        tx.send(OutboundMessage::DeleteBuf { id: bufsync_common::protocol::BufId(2) }).unwrap();
        drop(tx);

        let mut output = Vec::new();
        write_lines(&mut output, rx).await.unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![r#"{"name":"get_buf","id":1}"#, r#"{"name":"delete_buf","id":2}"#]);
    }
}
