// `bufsync diff`: produce the wire patch between two files.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};

use bufsync_common::content::{md5_text, ContentHash};
use bufsync_common::diff::Patch;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Original file.
    pub old: PathBuf,

    /// Edited file.
    pub new: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    pub patch: String,
    pub hunks: usize,
    pub md5_before: ContentHash,
    pub md5_after: ContentHash,
}

pub fn run(args: DiffArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match diff_files(&args.old, &args.new) {
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

pub fn read_text(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    String::from_utf8(bytes)
        .with_context(|| format!("{} is binary; only text buffers take patches", path.display()))
}

pub fn diff_files(old: &Path, new: &Path) -> anyhow::Result<DiffResult> {
    let old_text = read_text(old)?;
    let new_text = read_text(new)?;
    Ok(diff_texts(&old_text, &new_text))
}

fn diff_texts(old_text: &str, new_text: &str) -> DiffResult {
    let patch = Patch::make(old_text, new_text);
    DiffResult {
        patch: patch.to_text(),
        hunks: patch.hunks().len(),
        md5_before: md5_text(old_text),
        md5_after: md5_text(new_text),
    }
}

fn format_human(result: &DiffResult) -> String {
    if result.hunks == 0 {
        return "Files are identical.".into();
    }
    format!(
        "{}md5 {} -> {} ({} hunk(s))",
        result.patch, result.md5_before, result.md5_after, result.hunks
    )
}
