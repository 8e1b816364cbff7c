//! Ignore list matching.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decides whether a path is excluded from watching.
///
/// Entries are compared by exact string equality, no globbing and no prefix
/// matching. A path matches an entry if either its full form (the watch root
/// joined with directory entries) or its form relative to the watch root is
/// equal to the entry. So with root `/srv/site`, both `node_modules` and
/// `/srv/site/node_modules` exclude `/srv/site/node_modules`, but neither
/// excludes `/srv/site/node_modules/pkg`.
#[derive(Clone, Debug)]
pub struct IgnoreMatcher {
    root: PathBuf,
    entries: Arc<[String]>,
}

impl IgnoreMatcher {
    /// Create a matcher for paths under `root`.
    ///
    /// Empty entries are dropped.
    pub fn new<I, S>(root: impl Into<PathBuf>, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<String> = entries
            .into_iter()
            .map(Into::into)
            .filter(|entry| !entry.is_empty())
            .collect();
        Self {
            root: root.into(),
            entries: entries.into(),
        }
    }

    /// Returns `true` if `path` is on the ignore list.
    pub fn should_ignore(&self, path: &Path) -> bool {
        if self.entries.is_empty() {
            return false;
        }

        let full = path.to_string_lossy();
        let relative = path
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_string_lossy);

        self.entries.iter().any(|entry| {
            entry.as_str() == full.as_ref() || relative.as_deref() == Some(entry.as_str())
        })
    }

    /// Number of ignore entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is ignored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_ignores_nothing() {
        let matcher = IgnoreMatcher::new("/site", Vec::<String>::new());
        assert!(!matcher.should_ignore(Path::new("/site/node_modules")));
        assert!(matcher.is_empty());
    }

    #[test]
    fn test_relative_entry_matches_under_root() {
        let matcher = IgnoreMatcher::new("/site", ["node_modules"]);
        assert!(matcher.should_ignore(Path::new("/site/node_modules")));
        assert!(!matcher.should_ignore(Path::new("/site/src")));
    }

    #[test]
    fn test_full_path_entry_matches() {
        let matcher = IgnoreMatcher::new("/site", ["/site/dist"]);
        assert!(matcher.should_ignore(Path::new("/site/dist")));
        assert!(!matcher.should_ignore(Path::new("/site/dist2")));
    }

    #[test]
    fn test_no_prefix_matching() {
        let matcher = IgnoreMatcher::new("/site", ["node_modules"]);
        assert!(!matcher.should_ignore(Path::new("/site/node_modules/pkg")));
        assert!(!matcher.should_ignore(Path::new("/site/lib/node_modules")));
    }

    #[test]
    fn test_no_glob_matching() {
        let matcher = IgnoreMatcher::new("/site", ["*.tmp"]);
        assert!(!matcher.should_ignore(Path::new("/site/a.tmp")));
        assert!(matcher.should_ignore(Path::new("/site/*.tmp")));
    }

    #[test]
    fn test_current_dir_root() {
        let matcher = IgnoreMatcher::new(".", ["node_modules"]);
        let path = Path::new(".").join("node_modules");
        assert!(matcher.should_ignore(&path));
    }

    #[test]
    fn test_empty_entries_dropped() {
        let matcher = IgnoreMatcher::new("/site", ["", "dist", ""]);
        assert_eq!(matcher.len(), 1);
        assert!(!matcher.should_ignore(Path::new("/site")));
    }

    #[test]
    fn test_nested_relative_entry() {
        let matcher = IgnoreMatcher::new("/site", ["assets/cache"]);
        assert!(matcher.should_ignore(Path::new("/site/assets/cache")));
        assert!(!matcher.should_ignore(Path::new("/site/assets")));
    }
}
