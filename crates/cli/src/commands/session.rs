// `bufsync session`: run a sync session over stdin/stdout.
//
// Inbound server events are read from stdin and outbound events written to
// stdout, one JSON object per line. Logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tokio::sync::broadcast;
use tracing::info;

use bufsync_client::config::GlobalConfig;
use bufsync_client::marker::WorkspaceUrl;
use bufsync_client::session::{serve_stdio, SessionEnd, SessionOptions};
use bufsync_client::watcher::debounce::DebounceConfig;

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Project root (defaults to the current directory).
    pub root: Option<PathBuf>,

    /// Workspace url recorded in the `.bufsync` marker on join.
    #[arg(long)]
    pub url: Option<String>,

    /// Share the whole project once the workspace is joined.
    #[arg(long)]
    pub share: bool,

    /// Upload local file changes as they happen.
    #[arg(long)]
    pub watch: bool,

    /// Debounce window for local changes, clamped to 50..=500 ms.
    #[arg(long)]
    pub debounce_ms: Option<u64>,
}

pub fn run(args: SessionArgs) -> anyhow::Result<()> {
    let options = session_options(&args)?;
    let root = args.root.unwrap_or_else(|| PathBuf::from("."));
    let config = GlobalConfig::load();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let end = runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
        let ctrl_c_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = ctrl_c_tx.send(());
        });

        let end = serve_stdio(root, config, options, shutdown_rx).await;
        drop(shutdown_tx);
        end
    })?;

    let reason = match end {
        SessionEnd::Shutdown => "interrupted",
        SessionEnd::InboundClosed => "input closed",
        SessionEnd::Disconnected => "disconnected by the server",
    };
    info!(reason, "session ended");
    Ok(())
}

fn session_options(args: &SessionArgs) -> anyhow::Result<SessionOptions> {
    let workspace = args.url.as_deref().map(WorkspaceUrl::parse).transpose()?;
    let debounce = args.debounce_ms.map(DebounceConfig::with_millis).unwrap_or_default();
    Ok(SessionOptions { workspace, share: args.share, watch: args.watch, debounce })
}
