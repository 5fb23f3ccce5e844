//! Glob patterns over source-relative paths.
//!
//! Paths are `/`-separated strings relative to the source root. A `*` never
//! crosses a separator. A pattern ending in `/` or `/*` names a directory
//! and matches that directory and everything beneath it.
use glob::{MatchOptions, Pattern};

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    base: String,
    directory: bool,
    glob: Option<Pattern>,
}

impl PathPattern {
    /// Compile `raw`. Invalid glob syntax falls back to literal comparison.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches("./");
        let (base, directory) = if let Some(base) = trimmed.strip_suffix("/*") {
            (base, true)
        } else if let Some(base) = trimmed.strip_suffix('/') {
            (base, true)
        } else {
            (trimmed, false)
        };
        let base = base.trim_start_matches('/').to_string();
        let glob = Pattern::new(&base).ok();
        Self {
            raw: raw.to_string(),
            base,
            directory,
            glob,
        }
    }

    /// A pattern that matches `raw` literally, with no glob interpretation.
    ///
    /// Used for entries recorded by `add`, whose names may contain `[`, `?`
    /// or `*`.
    #[must_use]
    pub fn literal(raw: &str) -> Self {
        Self {
            glob: None,
            ..Self::new(raw)
        }
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern names a directory (`dir/` or `dir/*`).
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.directory
    }

    /// Pattern without its directory marker.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Whether the pattern is anchored at the root (contains a separator).
    #[must_use]
    pub fn is_anchored(&self) -> bool {
        self.base.contains('/')
    }

    /// Match the whole of `rel` against the pattern.
    #[must_use]
    pub fn matches_exact(&self, rel: &str) -> bool {
        self.glob
            .as_ref()
            .map_or(rel == self.base, |g| g.matches_with(rel, OPTIONS))
    }

    /// Match `rel` or any of its ancestors. The pattern text also matches
    /// itself literally.
    ///
    /// Unanchored patterns (no separator, such as `*.swp`) additionally
    /// match any single path segment, so they apply at every depth.
    #[must_use]
    pub fn matches(&self, rel: &str) -> bool {
        if self.base.is_empty() {
            return false;
        }
        let anchored = self.is_anchored();
        let mut end = 0;
        for segment in rel.split('/') {
            end += segment.len();
            let prefix = rel.get(..end).unwrap_or(rel);
            if prefix == self.base
                || self.matches_exact(prefix)
                || (!anchored && self.matches_exact(segment))
            {
                return true;
            }
            end += 1;
        }
        false
    }

    /// Whether some path strictly beneath `rel` could match this pattern.
    ///
    /// Used to decide whether a directory has descendants with their own
    /// destinations and must be expanded instead of linked whole.
    #[must_use]
    pub fn targets_descendant_of(&self, rel: &str) -> bool {
        let pattern_segments: Vec<&str> = self.base.split('/').collect();
        let rel_segments: Vec<&str> = rel.split('/').collect();
        if rel.is_empty() || pattern_segments.len() <= rel_segments.len() {
            return false;
        }
        pattern_segments.iter().zip(&rel_segments).all(|(pat, seg)| {
            if self.glob.is_some() {
                segment_matches(pat, seg)
            } else {
                pat == seg
            }
        })
    }
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    Pattern::new(pattern).map_or(pattern == segment, |g| g.matches_with(segment, OPTIONS))
}

/// Whether `rel` equals `prefix` or lies beneath it, segment-wise.
#[must_use]
pub fn is_under(rel: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    rel == prefix
        || rel
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
