// `bufsync scan`: list the files a share of the project would upload.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};

use bufsync_client::config::GlobalConfig;
use bufsync_client::scan::ScanTask;
use bufsync_common::path::to_rel_path;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Project root (defaults to the current directory).
    pub root: Option<PathBuf>,

    /// Upload ceiling in bytes (defaults to the configured value).
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub root: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub too_big: Vec<String>,
    pub cycles: usize,
}

pub fn run(args: ScanArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let root = args.root.unwrap_or_else(|| PathBuf::from("."));
    let max_file_size =
        args.max_file_size.unwrap_or_else(|| GlobalConfig::load().sync.max_file_size);

    match scan_project(&root, max_file_size) {
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

pub fn scan_project(root: &Path, max_file_size: u64) -> anyhow::Result<ScanResult> {
    let root = root
        .canonicalize()
        .with_context(|| format!("failed to open project root {}", root.display()))?;
    let mut task = ScanTask::new(&root, &root, max_file_size);

    let mut files = Vec::new();
    let mut too_big = Vec::new();
    let mut cycles = 0;
    loop {
        let cycle = task.next_cycle();
        cycles += 1;
        for path in cycle.uploads {
            files.push(to_rel_path(&root, &path)?);
        }
        for path in cycle.too_big {
            too_big.push(to_rel_path(&root, &path)?);
        }
        if cycle.finished {
            break;
        }
    }

    Ok(ScanResult { root: root.display().to_string(), files, too_big, cycles })
}

fn format_human(result: &ScanResult) -> String {
    let mut lines = Vec::new();
    if result.files.is_empty() {
        lines.push(format!("Nothing to share under {}.", result.root));
    } else {
        lines.extend(result.files.iter().cloned());
        lines.push(format!(
            "{} file(s) under {} in {} cycle(s)",
            result.files.len(),
            result.root,
            result.cycles
        ));
    }
    if !result.too_big.is_empty() {
        lines.push(format!("Skipped {} oversized file(s):", result.too_big.len()));
        for path in &result.too_big {
            lines.push(format!("  {path}"));
        }
    }
    lines.join("\n")
}
