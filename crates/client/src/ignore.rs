// Hierarchical ignore rules for the workspace scanner and watcher.
//
// Each directory gets an `IgnoreContext` holding the rules from its own
// ignore files plus a link to its parent's context. A path is checked
// against the nearest context first; the first context with a matching rule
// decides.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ::ignore::gitignore::{Gitignore, GitignoreBuilder};
use ::ignore::Match;
use tracing::{debug, warn};

/// Per-directory files holding ignore rules.
pub const IGNORE_FILES: [&str; 2] = [".gitignore", ".bufsyncignore"];

/// Hidden names that are still shared.
pub const HIDDEN_WHITELIST: [&str; 3] = [".bufsync", ".gitignore", ".bufsyncignore"];

/// Rules applied at the workspace root regardless of ignore files.
const BUILTIN_IGNORES: [&str; 1] = ["node_modules"];

/// True for dot-names that are not on the whitelist.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') && !HIDDEN_WHITELIST.contains(&name)
}

#[derive(Debug)]
pub struct IgnoreContext {
    dir: PathBuf,
    matcher: Gitignore,
    parent: Option<Arc<IgnoreContext>>,
}

impl IgnoreContext {
    /// Context for the workspace root, including the built-in rules.
    pub fn root(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf(), matcher: load_rules(dir, true), parent: None }
    }

    /// Context for `dir`, inheriting `parent`'s rules.
    pub fn child(parent: &Arc<IgnoreContext>, dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            matcher: load_rules(dir, false),
            parent: Some(Arc::clone(parent)),
        }
    }

    /// Build the chain from `root` down to `dir`.
    ///
    /// `dir` must lie under `root`; anything else yields the root context.
    pub fn for_dir(root: &Path, dir: &Path) -> Arc<IgnoreContext> {
        let mut context = Arc::new(Self::root(root));
        let Ok(relative) = dir.strip_prefix(root) else {
            return context;
        };
        let mut current = root.to_path_buf();
        for component in relative.components() {
            if let Component::Normal(name) = component {
                current.push(name);
                context = Arc::new(Self::child(&context, &current));
            }
        }
        context
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns a description of the matching rule when `path` is ignored.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> Option<String> {
        let mut context = Some(self);
        while let Some(current) = context {
            match current.matcher.matched(path, is_dir) {
                Match::Ignore(glob) => {
                    return Some(format!(
                        "{} ignored by `{}` in {}",
                        path.display(),
                        glob.original(),
                        current.dir.display()
                    ));
                }
                Match::Whitelist(_) => return None,
                Match::None => context = current.parent.as_deref(),
            }
        }
        None
    }
}

/// Check `path` and each of its ancestors below `root` for hidden names and
/// ignore rules, the same way a scan from `root` would reach it.
///
/// Returns the reason when the path would be skipped.
pub fn excluded_reason(root: &Path, path: &Path, is_dir: bool) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let names: Vec<&str> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect();

    let mut context = Arc::new(IgnoreContext::root(root));
    let mut current = root.to_path_buf();
    for (index, name) in names.iter().enumerate() {
        current.push(name);
        if is_hidden_name(name) {
            return Some(format!("{} is hidden", current.display()));
        }
        let last = index + 1 == names.len();
        if let Some(reason) = context.is_ignored(&current, !last || is_dir) {
            return Some(reason);
        }
        if !last {
            context = Arc::new(IgnoreContext::child(&context, &current));
        }
    }
    None
}

fn load_rules(dir: &Path, with_builtins: bool) -> Gitignore {
    let mut builder = GitignoreBuilder::new(dir);

    if with_builtins {
        for rule in BUILTIN_IGNORES {
            if let Err(error) = builder.add_line(None, rule) {
                warn!(rule, error = %error, "invalid built-in ignore rule");
            }
        }
    }

    for name in IGNORE_FILES {
        let file = dir.join(name);
        if !file.is_file() {
            continue;
        }
        debug!(path = %file.display(), "loading ignore rules");
        if let Some(error) = builder.add(&file) {
            warn!(path = %file.display(), error = %error, "failed to parse ignore file");
        }
    }

    match builder.build() {
        Ok(matcher) => matcher,
        Err(error) => {
            warn!(dir = %dir.display(), error = %error, "failed to compile ignore rules");
            Gitignore::empty()
        }
    }
}
