//! Projecting the source tree onto its destinations as symlinks.
use anyhow::{Context as _, Result};
use std::fmt;
use std::path::{Path, PathBuf};

use super::exclusion::ExclusionFilter;
use super::fs::{
    Foreign, LinkRecord, classify, create_symlink, ensure_parent_dir, is_link_into, link_target,
    paths_equal, prune_empty_dirs, remove_symlink, sorted_names,
};
use super::pattern::PathPattern;
use super::resolver::PathResolver;
use crate::error::SymfarmError;
use crate::logging::Log;

/// A destination the engine refused to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Source-relative path of the entry.
    pub rel: String,
    /// Destination that is occupied.
    pub destination: PathBuf,
    /// What occupies it.
    pub reason: String,
}

/// Per-entry outcomes of a link run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkReport {
    /// Entries that received a new symlink.
    pub linked: Vec<String>,
    /// Entries whose symlink was already correct.
    pub already_linked: Vec<String>,
    /// Entries covered by an ancestor's directory link.
    pub skipped: Vec<String>,
    /// Stale or superseded symlinks that were removed.
    pub removed: Vec<PathBuf>,
    /// Entries left alone because their destination is foreign.
    pub conflicts: Vec<Conflict>,
}

impl LinkReport {
    /// Number of filesystem changes made.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.linked.len() + self.removed.len()
    }
}

impl fmt::Display for LinkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "linked {}, already linked {}, skipped {}, removed {}, conflicts {}",
            self.linked.len(),
            self.already_linked.len(),
            self.skipped.len(),
            self.removed.len(),
            self.conflicts.len()
        )
    }
}

/// Symlinks removed by an unlink run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnlinkReport {
    /// Removed symlink paths, in walk order.
    pub removed: Vec<PathBuf>,
    /// Directories pruned after becoming empty.
    pub pruned: Vec<PathBuf>,
}

/// Links, unlinks, adopts and releases entries of one source root.
#[derive(Debug, Clone)]
pub struct LinkEngine {
    pub(super) source_root: PathBuf,
    pub(super) resolver: PathResolver,
    pub(super) filter: ExclusionFilter,
}

impl LinkEngine {
    /// Create an engine. `source_root` should be absolute and canonical so
    /// that link targets compare by prefix.
    #[must_use]
    pub fn new(source_root: &Path, resolver: PathResolver, filter: ExclusionFilter) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            resolver,
            filter,
        }
    }

    /// The managed source root.
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// The destination resolver.
    #[must_use]
    pub const fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub(super) fn source_path(&self, rel: &str) -> PathBuf {
        let mut path = self.source_root.clone();
        path.extend(rel.split('/').filter(|s| !s.is_empty()));
        path
    }

    /// Link every managed entry.
    ///
    /// Conflicts are collected and never stop independent entries; any other
    /// error aborts the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the source tree cannot be read or a link cannot be
    /// created or removed.
    pub fn link(&self, log: &dyn Log) -> Result<LinkReport> {
        let mut report = LinkReport::default();
        self.link_children("", &mut report, log)?;
        Ok(report)
    }

    fn link_children(&self, rel: &str, report: &mut LinkReport, log: &dyn Log) -> Result<()> {
        for name in sorted_names(&self.source_path(rel))? {
            self.link_entry(&join_rel(rel, &name), report, log)?;
        }
        Ok(())
    }

    fn link_entry(&self, rel: &str, report: &mut LinkReport, log: &dyn Log) -> Result<()> {
        if self.filter.is_excluded(rel) {
            log.debug(&format!("excluded: {rel}"));
            return Ok(());
        }

        let source = self.source_path(rel);
        let meta = std::fs::symlink_metadata(&source).map_err(|e| SymfarmError::from_io(e, &source))?;
        let destination = self.resolver.resolve(rel);
        if meta.file_type().is_symlink() {
            conflict(report, log, rel, &destination, "source entry is a symlink");
            return Ok(());
        }
        let is_dir = meta.is_dir();

        if is_dir && self.resolver.has_descendant_overrides(rel) {
            log.debug(&format!("expanding {rel}: descendants have their own destinations"));
            return self.link_children(rel, report, log);
        }

        if self.covered_by_ancestor(&destination) {
            log.debug(&format!("skipped {rel}: an ancestor link covers it"));
            report.skipped.push(rel.to_string());
            return Ok(());
        }

        match classify(&destination, &self.source_root)? {
            LinkRecord::Unlinked => {
                self.create_link(&source, &destination)?;
                log.info(&format!("linked {} -> {}", destination.display(), source.display()));
                report.linked.push(rel.to_string());
            }
            LinkRecord::LinkedToSource { target } if paths_equal(&target, &source) => {
                log.debug(&format!("already linked: {rel}"));
                report.already_linked.push(rel.to_string());
            }
            LinkRecord::ForeignConflict(Foreign::Directory) if is_dir => {
                if self.owns_tree(&destination)? {
                    self.supersede(&source, &destination, report, log)?;
                    report.linked.push(rel.to_string());
                } else {
                    self.remove_stale_children(&destination, report, log)?;
                    self.link_children(rel, report, log)?;
                }
            }
            LinkRecord::LinkedToSource { target } => {
                let reason = format!("linked to other source entry {}", target.display());
                conflict(report, log, rel, &destination, &reason);
            }
            LinkRecord::ForeignConflict(foreign) => {
                conflict(report, log, rel, &destination, &foreign.describe());
            }
        }
        Ok(())
    }

    fn create_link(&self, source: &Path, destination: &Path) -> Result<()> {
        ensure_parent_dir(destination)?;
        create_symlink(source, destination)
    }

    /// Whether a strict ancestor of `destination` is a symlink into the
    /// source root.
    fn covered_by_ancestor(&self, destination: &Path) -> bool {
        destination
            .ancestors()
            .skip(1)
            .any(|ancestor| is_link_into(ancestor, &self.source_root))
    }

    /// Whether `dir` holds nothing but links into the source root and
    /// directories that recursively satisfy the same condition.
    fn owns_tree(&self, dir: &Path) -> Result<bool> {
        for name in sorted_names(dir)? {
            let child = dir.join(&name);
            match classify(&child, &self.source_root)? {
                LinkRecord::LinkedToSource { .. } => {}
                LinkRecord::ForeignConflict(Foreign::Directory) => {
                    if !self.owns_tree(&child)? {
                        return Ok(false);
                    }
                }
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Replace an owned destination directory by one directory-level link.
    ///
    /// Every descendant link into the source root is removed first, then the
    /// emptied directories, then the new link is created.
    fn supersede(
        &self,
        source: &Path,
        destination: &Path,
        report: &mut LinkReport,
        log: &dyn Log,
    ) -> Result<()> {
        self.clear_owned_tree(destination, report, log)?;
        std::fs::remove_dir(destination)
            .map_err(|e| SymfarmError::from_io(e, destination))
            .with_context(|| format!("removing {}", destination.display()))?;
        create_symlink(source, destination)?;
        log.info(&format!(
            "linked {} -> {} (replaced per-file links)",
            destination.display(),
            source.display()
        ));
        Ok(())
    }

    fn clear_owned_tree(&self, dir: &Path, report: &mut LinkReport, log: &dyn Log) -> Result<()> {
        for name in sorted_names(dir)? {
            let child = dir.join(&name);
            if is_link_into(&child, &self.source_root) {
                remove_symlink(&child)?;
                log.debug(&format!("removed superseded link {}", child.display()));
                report.removed.push(child);
            } else {
                self.clear_owned_tree(&child, report, log)?;
                std::fs::remove_dir(&child)
                    .map_err(|e| SymfarmError::from_io(e, &child))
                    .with_context(|| format!("removing {}", child.display()))?;
            }
        }
        Ok(())
    }

    /// Remove child links of `dir` into the source root whose target does not
    /// resolve back to that child's path.
    fn remove_stale_children(&self, dir: &Path, report: &mut LinkReport, log: &dyn Log) -> Result<()> {
        for name in sorted_names(dir)? {
            let child = dir.join(&name);
            let LinkRecord::LinkedToSource { target } = classify(&child, &self.source_root)? else {
                continue;
            };
            let placed = self
                .relative_of(&target)
                .is_some_and(|rel| {
                    !self.filter.is_excluded(&rel)
                        && target.symlink_metadata().is_ok()
                        && paths_equal(&self.resolver.resolve(&rel), &child)
                });
            if !placed {
                remove_symlink(&child)?;
                log.info(&format!("removed stale link {}", child.display()));
                report.removed.push(child);
            }
        }
        Ok(())
    }

    /// Source-relative path of a link target under the source root.
    pub(super) fn relative_of(&self, target: &Path) -> Option<String> {
        let rel = target.strip_prefix(&self.source_root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Remove links into the source root from every destination the farm
    /// manages, optionally limited to entries matching `pattern`.
    ///
    /// Foreign links and non-link files are never removed. Directories left
    /// empty are pruned up to the output root (or up to the override
    /// destination's parent when it lies elsewhere).
    ///
    /// # Errors
    ///
    /// Returns an error if a destination cannot be read or a link cannot be
    /// removed.
    pub fn unlink(&self, pattern: Option<&str>, log: &dyn Log) -> Result<UnlinkReport> {
        let pattern = pattern.map(PathPattern::new);
        let mut roots = Vec::new();
        if self.source_root.is_dir() {
            self.collect_roots("", &mut roots)?;
        }
        roots.extend(self.resolver.override_destinations());
        roots.sort();
        roots.dedup();

        let mut report = UnlinkReport::default();
        for root in &roots {
            let boundary = self.prune_boundary(root);
            self.unlink_at(root, &boundary, pattern.as_ref(), &mut report, log)?;
        }
        Ok(report)
    }

    fn collect_roots(&self, rel: &str, roots: &mut Vec<PathBuf>) -> Result<()> {
        for name in sorted_names(&self.source_path(rel))? {
            let child = join_rel(rel, &name);
            if self.filter.is_excluded(&child) {
                continue;
            }
            let is_real_dir = std::fs::symlink_metadata(self.source_path(&child))
                .is_ok_and(|m| m.is_dir());
            if is_real_dir && self.resolver.has_descendant_overrides(&child) {
                self.collect_roots(&child, roots)?;
            } else {
                roots.push(self.resolver.resolve(&child));
            }
        }
        Ok(())
    }

    fn prune_boundary(&self, root: &Path) -> PathBuf {
        let output_root = self.resolver.output_root();
        if root.starts_with(output_root) {
            output_root.to_path_buf()
        } else {
            root.parent().map_or_else(|| root.to_path_buf(), Path::to_path_buf)
        }
    }

    fn unlink_at(
        &self,
        path: &Path,
        boundary: &Path,
        pattern: Option<&PathPattern>,
        report: &mut UnlinkReport,
        log: &dyn Log,
    ) -> Result<()> {
        match classify(path, &self.source_root)? {
            LinkRecord::Unlinked | LinkRecord::ForeignConflict(Foreign::File | Foreign::Symlink(_)) => {}
            LinkRecord::LinkedToSource { target } => {
                let rel = self.relative_of(&target).unwrap_or_default();
                if pattern.is_none_or(|p| p.matches(&rel)) {
                    remove_symlink(path)?;
                    log.info(&format!("unlinked {}", path.display()));
                    report.removed.push(path.to_path_buf());
                    if let Some(parent) = path.parent() {
                        report.pruned.extend(prune_empty_dirs(parent, boundary));
                    }
                }
            }
            LinkRecord::ForeignConflict(Foreign::Directory) => {
                for name in sorted_names(path)? {
                    self.unlink_at(&path.join(name), boundary, pattern, report, log)?;
                }
            }
        }
        Ok(())
    }

    /// Absolute link target of `destination` when it is a link into the
    /// source root.
    pub(super) fn owned_target(&self, destination: &Path) -> Option<PathBuf> {
        link_target(destination)
            .ok()
            .filter(|t| t.starts_with(&self.source_root))
    }
}

fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn conflict(report: &mut LinkReport, log: &dyn Log, rel: &str, destination: &Path, reason: &str) {
    log.warn(&format!(
        "conflict: {rel} -> {} ({reason})",
        destination.display()
    ));
    report.conflicts.push(Conflict {
        rel: rel.to_string(),
        destination: destination.to_path_buf(),
        reason: reason.to_string(),
    });
}

#[cfg(test)]
#[cfg(unix)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::Override;
    use crate::logging::RecordingLog;

    struct Farm {
        _tmp: tempfile::TempDir,
        source: PathBuf,
        home: PathBuf,
    }

    impl Farm {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let base = dunce::canonicalize(tmp.path()).unwrap();
            let source = base.join("source");
            let home = base.join("home");
            std::fs::create_dir_all(&source).unwrap();
            std::fs::create_dir_all(&home).unwrap();
            Self {
                _tmp: tmp,
                source,
                home,
            }
        }

        fn file(&self, rel: &str) -> &Self {
            let path = self.source.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, rel).unwrap();
            self
        }

        fn engine(&self, overrides: &[(&str, &str)], exclusions: &[&str]) -> LinkEngine {
            let overrides: Vec<Override> = overrides
                .iter()
                .map(|(p, d)| Override {
                    pattern: (*p).to_string(),
                    destination: self.home.join(d),
                    recorded: false,
                })
                .collect();
            let exclusions: Vec<String> = exclusions.iter().map(ToString::to_string).collect();
            LinkEngine::new(
                &self.source,
                PathResolver::new(&self.home, &overrides),
                ExclusionFilter::new("symfarm.toml", &exclusions),
            )
        }
    }

    #[test]
    fn second_run_changes_nothing() {
        let farm = Farm::new();
        farm.file("a.conf").file("nvim/init.lua");
        let engine = farm.engine(&[("a.conf", ".a.conf")], &[]);
        let log = RecordingLog::new();

        let first = engine.link(&log).unwrap();
        assert_eq!(first.linked, vec!["a.conf", "nvim"]);

        let second = engine.link(&log).unwrap();
        assert_eq!(second.mutations(), 0);
        assert_eq!(second.already_linked, vec!["a.conf", "nvim"]);
    }

    #[test]
    fn builtin_and_excluded_entries_are_ignored() {
        let farm = Farm::new();
        farm.file(".gitignore")
            .file("symfarm.toml")
            .file(".git/HEAD")
            .file("private/key")
            .file("bashrc");
        let engine = farm.engine(&[], &["private"]);
        let report = engine.link(&RecordingLog::new()).unwrap();
        assert_eq!(report.linked, vec!["bashrc"]);
        assert!(report.conflicts.is_empty());
        assert!(farm.home.join(".git").symlink_metadata().is_err());
    }

    #[test]
    fn excluded_child_of_foreign_directory_never_conflicts() {
        let farm = Farm::new();
        farm.file("cfg/keep").file("cfg/skip.swp");
        std::fs::create_dir_all(farm.home.join("cfg")).unwrap();
        std::fs::write(farm.home.join("cfg/user-file"), "mine").unwrap();
        std::fs::write(farm.home.join("cfg/skip.swp"), "mine").unwrap();
        let engine = farm.engine(&[], &["*.swp"]);

        let report = engine.link(&RecordingLog::new()).unwrap();
        assert_eq!(report.linked, vec!["cfg/keep"]);
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn regular_file_destination_is_a_conflict_and_untouched() {
        let farm = Farm::new();
        farm.file("bashrc").file("vimrc");
        std::fs::write(farm.home.join("bashrc"), "user data").unwrap();
        let engine = farm.engine(&[], &[]);

        let report = engine.link(&RecordingLog::new()).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].rel, "bashrc");
        assert_eq!(report.linked, vec!["vimrc"]);
        assert_eq!(
            std::fs::read_to_string(farm.home.join("bashrc")).unwrap(),
            "user data"
        );
    }

    #[test]
    fn foreign_symlink_is_a_conflict() {
        let farm = Farm::new();
        farm.file("profile");
        create_symlink(Path::new("/etc/hosts"), &farm.home.join("profile")).unwrap();
        let report = farm.engine(&[], &[]).link(&RecordingLog::new()).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.conflicts[0].reason.contains("/etc/hosts"));
    }

    #[test]
    fn source_symlinks_are_not_followed() {
        let farm = Farm::new();
        farm.file("real/file");
        create_symlink(&farm.source.join("real"), &farm.source.join("alias")).unwrap();
        let report = farm.engine(&[], &[]).link(&RecordingLog::new()).unwrap();
        assert_eq!(report.linked, vec!["real"]);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].rel, "alias");
    }

    #[test]
    fn owned_directory_is_superseded_by_directory_link() {
        let farm = Farm::new();
        farm.file("nvim/init.lua").file("nvim/lua/plugins.lua");
        let dest = farm.home.join("nvim");
        std::fs::create_dir_all(dest.join("lua")).unwrap();
        create_symlink(&farm.source.join("nvim/init.lua"), &dest.join("init.lua")).unwrap();
        create_symlink(
            &farm.source.join("nvim/lua/plugins.lua"),
            &dest.join("lua/plugins.lua"),
        )
        .unwrap();

        let report = farm.engine(&[], &[]).link(&RecordingLog::new()).unwrap();
        assert_eq!(report.linked, vec!["nvim"]);
        assert_eq!(report.removed.len(), 2);
        assert_eq!(std::fs::read_link(&dest).unwrap(), farm.source.join("nvim"));
    }

    #[test]
    fn foreign_directory_is_descended_and_stale_links_removed() {
        let farm = Farm::new();
        farm.file("ssh/config");
        let dest = farm.home.join("ssh");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("known_hosts"), "user").unwrap();
        create_symlink(&farm.source.join("ssh/old"), &dest.join("old")).unwrap();

        let engine = farm.engine(&[], &[]);
        let report = engine.link(&RecordingLog::new()).unwrap();
        assert_eq!(report.linked, vec!["ssh/config"]);
        assert_eq!(report.removed, vec![dest.join("old")]);
        assert!(dest.join("known_hosts").exists());

        let again = engine.link(&RecordingLog::new()).unwrap();
        assert_eq!(again.mutations(), 0);
    }

    #[test]
    fn descendant_override_expands_directory() {
        let farm = Farm::new();
        farm.file("group/config").file("group/other");
        let engine = farm.engine(&[("group/config", "etc/app/config")], &[]);

        let report = engine.link(&RecordingLog::new()).unwrap();
        assert_eq!(report.linked, vec!["group/config", "group/other"]);
        assert!(
            farm.home
                .join("etc/app/config")
                .symlink_metadata()
                .unwrap()
                .file_type()
                .is_symlink()
        );
        assert!(farm.home.join("group").is_dir());
        assert!(
            !farm
                .home
                .join("group")
                .symlink_metadata()
                .unwrap()
                .file_type()
                .is_symlink()
        );
    }

    #[test]
    fn entries_under_linked_ancestor_are_skipped() {
        let farm = Farm::new();
        farm.file("dots/inner/file");
        farm.file("x");
        // Destination of `x` lives inside the linked `dots` directory.
        let engine = farm.engine(&[("x", "dots/inner/x")], &[]);
        let report = engine.link(&RecordingLog::new()).unwrap();
        assert_eq!(report.linked, vec!["dots"]);
        assert_eq!(report.skipped, vec!["x"]);
    }

    #[test]
    fn unlink_removes_only_links_into_source() {
        let farm = Farm::new();
        farm.file("bashrc").file("nvim/init.lua");
        let engine = farm.engine(&[("nvim/", ".config/nvim")], &[]);
        engine.link(&RecordingLog::new()).unwrap();
        std::fs::write(farm.home.join("unrelated"), "keep").unwrap();

        let report = engine.unlink(None, &RecordingLog::new()).unwrap();
        assert_eq!(report.removed.len(), 2);
        assert!(farm.home.join("bashrc").symlink_metadata().is_err());
        assert!(!farm.home.join(".config").exists(), "empty parent pruned");
        assert!(farm.home.join("unrelated").exists());
        assert!(farm.home.exists());
    }

    #[test]
    fn unlink_with_pattern_is_selective() {
        let farm = Farm::new();
        farm.file("bashrc").file("vimrc");
        let engine = farm.engine(&[], &[]);
        engine.link(&RecordingLog::new()).unwrap();

        let report = engine.unlink(Some("vim*"), &RecordingLog::new()).unwrap();
        assert_eq!(report.removed, vec![farm.home.join("vimrc")]);
        assert!(farm.home.join("bashrc").symlink_metadata().is_ok());
    }

    #[test]
    fn unlink_leaves_foreign_links_and_files() {
        let farm = Farm::new();
        farm.file("cfg/a").file("profile");
        std::fs::create_dir_all(farm.home.join("cfg")).unwrap();
        std::fs::write(farm.home.join("cfg/user"), "u").unwrap();
        create_symlink(Path::new("/etc/hosts"), &farm.home.join("profile")).unwrap();
        let engine = farm.engine(&[], &[]);
        engine.link(&RecordingLog::new()).unwrap();

        let report = engine.unlink(None, &RecordingLog::new()).unwrap();
        assert_eq!(report.removed, vec![farm.home.join("cfg/a")]);
        assert!(farm.home.join("cfg/user").exists());
        assert_eq!(
            std::fs::read_link(farm.home.join("profile")).unwrap(),
            PathBuf::from("/etc/hosts")
        );
    }

    #[test]
    fn report_display_summarises_counts() {
        let report = LinkReport {
            linked: vec!["a".to_string()],
            ..LinkReport::default()
        };
        insta::assert_snapshot!(report.to_string(), @"linked 1, already linked 0, skipped 0, removed 0, conflicts 0");
    }
}
