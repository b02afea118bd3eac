// Workspace-relative buffer paths.

pub mod normalize;

pub use normalize::{is_shared, normalize_buf_path, to_full_path, to_rel_path, PathError};
