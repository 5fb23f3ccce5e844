//! Source-relative path to destination mapping.
use std::path::{Path, PathBuf};

use super::pattern::PathPattern;
use crate::config::{Config, Override};

/// Maps source-relative paths to destinations.
///
/// The longest matching prefix of a path wins; within one prefix length the
/// first configured override wins. Unmatched paths land under the output
/// root. Resolution never touches the filesystem.
#[derive(Debug, Clone)]
pub struct PathResolver {
    output_root: PathBuf,
    overrides: Vec<(PathPattern, PathBuf)>,
}

impl PathResolver {
    /// Build a resolver from an output root and ordered overrides.
    #[must_use]
    pub fn new(output_root: &Path, overrides: &[Override]) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            overrides: overrides
                .iter()
                .map(|o| {
                    let pattern = if o.recorded {
                        PathPattern::literal(&o.pattern)
                    } else {
                        PathPattern::new(&o.pattern)
                    };
                    (pattern, o.destination.clone())
                })
                .collect(),
        }
    }

    /// Build a resolver from the normalised configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.output_root, &config.overrides)
    }

    /// Default placement root.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Destination for `rel`.
    #[must_use]
    pub fn resolve(&self, rel: &str) -> PathBuf {
        let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
        for len in (1..=segments.len()).rev() {
            let (head, rest) = segments.split_at(len);
            let prefix = head.join("/");
            if let Some((_, destination)) = self
                .overrides
                .iter()
                .find(|(pattern, _)| pattern.matches_exact(&prefix))
            {
                return join_segments(destination, rest);
            }
        }
        join_segments(&self.output_root, &segments)
    }

    /// Whether some override targets a path strictly beneath `rel`.
    #[must_use]
    pub fn has_descendant_overrides(&self, rel: &str) -> bool {
        self.overrides
            .iter()
            .any(|(pattern, _)| pattern.targets_descendant_of(rel))
    }

    /// Destinations named literally by overrides, for walks that start from
    /// the target side.
    #[must_use]
    pub fn override_destinations(&self) -> Vec<PathBuf> {
        self.overrides.iter().map(|(_, d)| d.clone()).collect()
    }
}

fn join_segments(base: &Path, segments: &[&str]) -> PathBuf {
    let mut path = base.to_path_buf();
    path.extend(segments);
    path
}
