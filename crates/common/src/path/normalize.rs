// Buffer path canonicalization: NFC normalization, posix separators,
// traversal rejection, and conversion between workspace-relative and
// on-disk paths.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Maximum allowed buffer path length in characters.
const MAX_PATH_CHARS: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,

    #[error("path `{0}` is outside the shared root")]
    OutsideRoot(String),

    #[error("path `{0}` is not valid unicode")]
    NotUnicode(String),
}

/// Normalize a workspace-relative buffer path.
///
/// Rules:
/// - Apply Unicode NFC normalization (macOS hands out decomposed names)
/// - Convert all separators to `/`
/// - Collapse consecutive `/` and strip leading/trailing `/`
/// - Reject `.` and `..` components, null bytes and empty paths
pub fn normalize_buf_path(input: &str) -> Result<String, PathError> {
    if input.is_empty() {
        return Err(PathError::Empty);
    }
    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let normalized: String = input.nfc().collect();
    let unified = normalized.replace('\\', "/");
    let components: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();

    if components.is_empty() {
        return Err(PathError::Empty);
    }

    for component in &components {
        if *component == "." || *component == ".." {
            return Err(PathError::Traversal((*component).to_string()));
        }
    }

    let result = components.join("/");
    if result.chars().count() > MAX_PATH_CHARS {
        return Err(PathError::TooLong);
    }

    Ok(result)
}

/// True when `path` lies inside `root` (lexically; callers canonicalize).
pub fn is_shared(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
        && !path.components().any(|component| matches!(component, Component::ParentDir))
}

/// Convert an on-disk path under `root` to a normalized buffer path.
pub fn to_rel_path(root: &Path, path: &Path) -> Result<String, PathError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PathError::OutsideRoot(path.display().to_string()))?;
    let relative =
        relative.to_str().ok_or_else(|| PathError::NotUnicode(path.display().to_string()))?;
    normalize_buf_path(relative)
}

/// Resolve a buffer path to its on-disk location under `root`.
pub fn to_full_path(root: &Path, buf_path: &str) -> Result<PathBuf, PathError> {
    let normalized = normalize_buf_path(buf_path)?;
    Ok(normalized.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part)))
}
