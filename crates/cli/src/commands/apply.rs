// `bufsync apply`: apply a wire patch to a file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use serde::{Deserialize, Serialize};

use bufsync_common::content::{md5_text, ContentHash};
use bufsync_common::diff::Patch;

use super::diff::read_text;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// File to patch.
    pub file: PathBuf,

    /// File holding the patch text.
    pub patch: PathBuf,

    /// Expected md5 of the patched content; a mismatch fails the command.
    #[arg(long)]
    pub md5_after: Option<ContentHash>,

    /// Write the result back to FILE instead of printing it.
    #[arg(long)]
    pub in_place: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    pub path: String,
    pub hunks: usize,
    pub md5_after: ContentHash,
    pub written: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

pub fn run(args: ApplyArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match apply_file(&args.file, &args.patch, args.md5_after.as_deref(), args.in_place) {
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

pub fn apply_file(
    file: &Path,
    patch_file: &Path,
    expected_md5: Option<&str>,
    in_place: bool,
) -> anyhow::Result<ApplyResult> {
    let text = read_text(file)?;
    let patch_text = std::fs::read_to_string(patch_file)
        .with_context(|| format!("failed to read {}", patch_file.display()))?;
    let patch = Patch::from_text(&patch_text)
        .with_context(|| format!("{} is not a valid patch", patch_file.display()))?;

    let (patched, applied) = patch.apply(&text);
    let failed = applied.iter().filter(|ok| !**ok).count();
    if failed > 0 {
        bail!("{failed} of {} patch hunks failed to apply to {}", applied.len(), file.display());
    }

    let md5_after = md5_text(&patched);
    if let Some(expected) = expected_md5.filter(|expected| *expected != md5_after) {
        bail!("patched md5 {md5_after} does not match the expected {expected}");
    }

    let path = file.display().to_string();
    if in_place {
        std::fs::write(file, &patched)
            .with_context(|| format!("failed to write {}", file.display()))?;
        return Ok(ApplyResult { path, hunks: applied.len(), md5_after, written: true, text: None });
    }
    Ok(ApplyResult { path, hunks: applied.len(), md5_after, written: false, text: Some(patched) })
}

fn format_human(result: &ApplyResult) -> String {
    match &result.text {
        Some(text) => text.clone(),
        None => format!(
            "Patched {} ({} hunk(s)), md5 {}",
            result.path, result.hunks, result.md5_after
        ),
    }
}
