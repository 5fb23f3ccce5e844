//! Which source entries never become links.
use super::pattern::PathPattern;

/// Root-level names that are always excluded, besides the meta file.
const BUILTIN: [&str; 2] = [".git", ".gitignore"];

/// Exclusion predicate over source-relative paths.
///
/// Built-in names (repository metadata, the ignore file, the meta file) are
/// only checked against the first path segment. User patterns apply to the
/// path and every ancestor, so an excluded directory excludes its subtree.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    meta_name: String,
    patterns: Vec<PathPattern>,
}

impl ExclusionFilter {
    /// Build a filter from the meta file name and `no-sym` patterns.
    #[must_use]
    pub fn new(meta_name: &str, patterns: &[String]) -> Self {
        Self {
            meta_name: meta_name.to_string(),
            patterns: patterns.iter().map(|p| PathPattern::new(p)).collect(),
        }
    }

    /// Whether `rel` or one of its ancestors is excluded.
    #[must_use]
    pub fn is_excluded(&self, rel: &str) -> bool {
        let first = rel.split('/').next().unwrap_or(rel);
        if BUILTIN.contains(&first) || first == self.meta_name {
            return true;
        }
        self.patterns.iter().any(|p| p.matches(rel))
    }
}
