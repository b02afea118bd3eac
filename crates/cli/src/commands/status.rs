// `bufsync status`: show the workspace marker and effective settings.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};

use bufsync_client::config::{global_config_path, GlobalConfig, RefetchSettings, SyncSettings};
use bufsync_client::marker::read_marker;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Project root (defaults to the current directory).
    pub root: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub root: String,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub sync: SyncSettings,
    pub refetch: RefetchSettings,
}

pub fn run(args: StatusArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let root = args.root.unwrap_or_else(|| PathBuf::from("."));
    let config_path = global_config_path();

    match collect_status(&root, GlobalConfig::load(), config_path.as_deref()) {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

pub fn collect_status(
    root: &Path,
    config: GlobalConfig,
    config_path: Option<&Path>,
) -> anyhow::Result<StatusResult> {
    let workspace = read_marker(root)?.map(|url| url.to_string());
    Ok(StatusResult {
        root: root.display().to_string(),
        workspace,
        config_path: config_path.map(|path| path.display().to_string()),
        display_name: config.display_name,
        sync: config.sync,
        refetch: config.refetch,
    })
}

fn format_human(result: &StatusResult) -> String {
    let mut lines = Vec::new();
    match &result.workspace {
        Some(url) => lines.push(format!("Workspace: {url}")),
        None => lines.push(format!("No workspace joined at {}", result.root)),
    }
    if let Some(name) = &result.display_name {
        lines.push(format!("Display name: {name}"));
    }
    if let Some(path) = &result.config_path {
        lines.push(format!("Config: {path}"));
    }

    let sync = &result.sync;
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };
    lines.push(format!("  delete_local_files: {}", on_off(sync.delete_local_files)));
    lines.push(format!("  show_highlights: {}", on_off(sync.show_highlights)));
    lines.push(format!("  sparse_mode: {}", on_off(sync.sparse_mode)));
    lines.push(format!("  get_bufs: {}", on_off(sync.get_bufs)));
    lines.push(format!("  max_file_size: {} bytes", sync.max_file_size));
    lines.push(format!(
        "  refetch: {} ms timeout, {} attempt(s)",
        result.refetch.timeout_ms, result.refetch.max_attempts
    ));
    lines.join("\n")
}
