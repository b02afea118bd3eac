// Text diffing and context patches.

pub mod myers;
pub mod patch;

pub use myers::{diff_chars, Diff, DiffOp};
pub use patch::{Hunk, Patch, PatchError};
