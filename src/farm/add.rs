//! Adopting paths into the farm and releasing them again.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use super::engine::LinkEngine;
use super::fs::{create_symlink, ensure_parent_dir, move_path, paths_equal, prune_empty_dirs, remove_symlink};
use super::pattern::PathPattern;
use crate::config::normalize_relative;
use crate::error::SymfarmError;
use crate::logging::Log;

/// Persistent record of which source entries map to which destinations.
pub trait MappingStore {
    /// Remember that `rel` belongs at `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn record(&mut self, rel: &str, destination: &Path) -> Result<()>;

    /// Forget the destination recorded for `rel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn forget(&mut self, rel: &str) -> Result<()>;
}

/// Result of a successful `add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    /// Source-relative path the content now lives at.
    pub rel: String,
    /// Absolute path inside the source root.
    pub source: PathBuf,
    /// Original location, now a symlink.
    pub destination: PathBuf,
}

/// Outcome of releasing entries back to their destinations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Entries moved back out of the farm.
    pub restored: Vec<(String, PathBuf)>,
    /// Entries that could not be released, with the reason.
    pub failures: Vec<(String, String)>,
    /// Group directories removed from the source tree.
    pub pruned: Vec<PathBuf>,
}

impl LinkEngine {
    /// Move `path` into the source root (optionally under `group`), link it
    /// back to where it was, and record the mapping.
    ///
    /// On any failure after the move the content is moved back and no
    /// mapping is left behind.
    ///
    /// # Errors
    ///
    /// Returns [`SymfarmError::InvalidInput`] for paths that cannot be
    /// adopted, or the underlying error if the move, link or record fails.
    pub fn add(
        &self,
        path: &Path,
        group: Option<&str>,
        store: &mut dyn MappingStore,
        log: &dyn Log,
    ) -> Result<Added> {
        self.check_addable(path)?;
        let group_rel = match group {
            Some(g) => validate_group(g)?,
            None => String::new(),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SymfarmError::InvalidInput(format!("{} has no file name", path.display())))?;

        let group_dir = self.source_path(&group_rel);
        let rel = self.unique_rel(&group_rel, &name);
        let source = self.source_path(&rel);

        std::fs::create_dir_all(&group_dir)
            .map_err(|e| SymfarmError::from_io(e, &group_dir))
            .with_context(|| format!("creating {}", group_dir.display()))?;
        if let Err(e) = move_path(path, &source) {
            prune_empty_dirs(&group_dir, &self.source_root);
            return Err(e);
        }
        log.debug(&format!("moved {} -> {}", path.display(), source.display()));

        let linked = create_symlink(&source, path).and_then(|()| {
            store.record(&rel, path).inspect_err(|_| {
                if let Err(undo) = remove_symlink(path) {
                    log.error(&format!("rollback: {undo:#}"));
                }
            })
        });
        if let Err(e) = linked {
            if let Err(undo) = move_path(&source, path) {
                log.error(&format!(
                    "rollback failed, content left at {}: {undo:#}",
                    source.display()
                ));
            } else {
                prune_empty_dirs(&group_dir, &self.source_root);
            }
            return Err(e.context(format!("adding {}", path.display())));
        }

        log.info(&format!("linked {} -> {}", path.display(), source.display()));
        Ok(Added {
            rel,
            source,
            destination: path.to_path_buf(),
        })
    }

    fn check_addable(&self, path: &Path) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(SymfarmError::InvalidInput(msg).into()) };
        if !path.is_absolute() {
            return invalid(format!("{} is not an absolute path", path.display()));
        }
        let Ok(meta) = std::fs::symlink_metadata(path) else {
            return invalid(format!("{} does not exist", path.display()));
        };
        if meta.file_type().is_symlink() {
            return if self.owned_target(path).is_some() {
                invalid(format!("{} is already linked", path.display()))
            } else {
                invalid(format!("{} is a symlink", path.display()))
            };
        }
        // A path reached through a directory link into the farm already
        // lives in the source root, so compare the resolved location.
        let resolved = resolve_parent(path)?;
        if resolved.starts_with(&self.source_root) {
            return invalid(format!("{} is inside the source root", path.display()));
        }
        if self.source_root.starts_with(&resolved) {
            return invalid(format!("{} contains the source root", path.display()));
        }
        Ok(())
    }

    /// First free name for `name` in `group`, appending `_N` before the
    /// extension when taken. Excluded names count as taken.
    fn unique_rel(&self, group: &str, name: &str) -> String {
        let join = |n: &str| {
            if group.is_empty() {
                n.to_string()
            } else {
                format!("{group}/{n}")
            }
        };
        let taken = |rel: &str| {
            self.filter.is_excluded(rel) || self.source_path(rel).symlink_metadata().is_ok()
        };

        let first = join(name);
        if !taken(&first) {
            return first;
        }
        let (stem, ext) = split_extension(name);
        (1u32..)
            .map(|n| join(&format!("{stem}_{n}{ext}")))
            .find(|candidate| !taken(candidate))
            .unwrap_or(first)
    }

    /// Move every mapped entry matching `pattern` back to its destination
    /// and drop its mapping.
    ///
    /// Per-entry failures are collected; the caller decides the exit status.
    ///
    /// # Errors
    ///
    /// Returns [`SymfarmError::InvalidInput`] if nothing matches.
    pub fn materialize(
        &self,
        pattern: &str,
        mappings: &[(String, PathBuf)],
        store: &mut dyn MappingStore,
        log: &dyn Log,
    ) -> Result<MaterializeReport> {
        let matcher = PathPattern::new(pattern);
        let selected: Vec<&(String, PathBuf)> =
            mappings.iter().filter(|(rel, _)| matcher.matches(rel)).collect();
        if selected.is_empty() {
            return Err(SymfarmError::InvalidInput(format!(
                "no mapped entries match '{pattern}'"
            ))
            .into());
        }

        let mut report = MaterializeReport::default();
        for (rel, destination) in selected {
            match self.materialize_one(rel, destination, store, log) {
                Ok(pruned) => {
                    log.info(&format!("restored {}", destination.display()));
                    report.restored.push((rel.clone(), destination.clone()));
                    report.pruned.extend(pruned);
                }
                Err(e) => {
                    log.error(&format!("{rel}: {e:#}"));
                    report.failures.push((rel.clone(), format!("{e:#}")));
                }
            }
        }
        Ok(report)
    }

    fn materialize_one(
        &self,
        rel: &str,
        destination: &Path,
        store: &mut dyn MappingStore,
        log: &dyn Log,
    ) -> Result<Vec<PathBuf>> {
        let source = self.source_path(rel);
        if source.symlink_metadata().is_err() {
            return Err(SymfarmError::InvalidInput(format!(
                "{} is missing from the source root",
                source.display()
            ))
            .into());
        }

        let had_link = match destination.symlink_metadata() {
            Err(_) => false,
            Ok(meta)
                if meta.file_type().is_symlink()
                    && self
                        .owned_target(destination)
                        .is_some_and(|t| paths_equal(&t, &source)) =>
            {
                remove_symlink(destination)?;
                true
            }
            Ok(_) => {
                return Err(SymfarmError::InvalidInput(format!(
                    "{} exists and is not a link to {}",
                    destination.display(),
                    source.display()
                ))
                .into());
            }
        };

        let restore_link = |log: &dyn Log| {
            if had_link && let Err(undo) = create_symlink(&source, destination) {
                log.error(&format!("rollback: {undo:#}"));
            }
        };

        if let Err(e) = ensure_parent_dir(destination).and_then(|()| move_path(&source, destination)) {
            restore_link(log);
            return Err(e);
        }

        if let Err(e) = store.forget(rel) {
            if let Err(undo) = move_path(destination, &source) {
                log.error(&format!(
                    "rollback failed, content left at {}: {undo:#}",
                    destination.display()
                ));
            } else {
                restore_link(log);
            }
            return Err(e);
        }

        let pruned = source
            .parent()
            .map(|parent| prune_empty_dirs(parent, &self.source_root))
            .unwrap_or_default();
        for dir in &pruned {
            log.info(&format!("removed empty group {}", dir.display()));
        }
        Ok(pruned)
    }
}

/// `path` with its parent directory canonicalised; the final component is
/// kept as is.
fn resolve_parent(path: &Path) -> Result<PathBuf> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(path.to_path_buf());
    };
    let parent = dunce::canonicalize(parent)
        .with_context(|| format!("resolving {}", parent.display()))?;
    Ok(parent.join(name))
}

/// Validate a group name: relative, no `..`, not empty after cleanup.
fn validate_group(group: &str) -> Result<String> {
    let cleaned = normalize_relative(group);
    let cleaned = cleaned.trim_end_matches('/');
    let escapes = Path::new(group).is_absolute()
        || group.starts_with('/')
        || cleaned.split('/').any(|s| s == "..");
    if escapes || cleaned.is_empty() {
        return Err(SymfarmError::InvalidInput(format!("invalid group name '{group}'")).into());
    }
    Ok(cleaned.to_string())
}

/// Split `name` into stem and extension (with its dot). A leading dot does
/// not start an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
