// `bufsync hash`: print content fingerprints as the server computes them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};

use bufsync_common::content::{BufContent, ContentHash, Encoding};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct HashArgs {
    /// Files to fingerprint.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResult {
    #[serde(default)]
    pub files: Vec<FileHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHash {
    pub path: String,
    pub md5: ContentHash,
    pub encoding: Encoding,
    pub size: u64,
}

pub fn run(args: HashArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result: anyhow::Result<HashResult> = args
        .paths
        .iter()
        .map(|path| hash_file(path))
        .collect::<anyhow::Result<Vec<_>>>()
        .map(|files| HashResult { files });

    match result {
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

pub fn hash_file(path: &Path) -> anyhow::Result<FileHash> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let size = bytes.len() as u64;
    let content = BufContent::from_bytes(bytes);
    Ok(FileHash {
        path: path.display().to_string(),
        md5: content.md5(),
        encoding: content.encoding(),
        size,
    })
}

fn format_human(result: &HashResult) -> String {
    result
        .files
        .iter()
        .map(|file| {
            format!("{}  {} ({}, {} bytes)", file.md5, file.path, file.encoding.as_str(), file.size)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
