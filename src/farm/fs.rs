//! Filesystem primitives: link classification, symlink creation/removal,
//! moves across filesystems, and pruning of empty directories.
use anyhow::{Context as _, Result};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::SymfarmError;

/// What currently occupies a destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRecord {
    /// Nothing is there (not even a dangling link).
    Unlinked,
    /// A symlink whose target lies under the source root.
    LinkedToSource {
        /// Absolute link target.
        target: PathBuf,
    },
    /// Something the farm does not own.
    ForeignConflict(Foreign),
}

/// Kinds of foreign occupant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Foreign {
    /// A symlink pointing outside the source root.
    Symlink(PathBuf),
    /// An ordinary directory.
    Directory,
    /// A regular file or other non-directory.
    File,
}

impl Foreign {
    /// Short human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Symlink(target) => format!("symlink to {}", target.display()),
            Self::Directory => "existing directory".to_string(),
            Self::File => "existing file".to_string(),
        }
    }
}

/// Classify `dest` without following it.
///
/// # Errors
///
/// Returns an error if metadata or the link cannot be read for a reason
/// other than absence.
pub fn classify(dest: &Path, source_root: &Path) -> Result<LinkRecord> {
    let meta = match std::fs::symlink_metadata(dest) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LinkRecord::Unlinked),
        Err(e) => return Err(SymfarmError::from_io(e, dest)),
    };
    if meta.file_type().is_symlink() {
        let target = link_target(dest)?;
        if target.starts_with(source_root) {
            return Ok(LinkRecord::LinkedToSource { target });
        }
        return Ok(LinkRecord::ForeignConflict(Foreign::Symlink(target)));
    }
    if meta.is_dir() {
        Ok(LinkRecord::ForeignConflict(Foreign::Directory))
    } else {
        Ok(LinkRecord::ForeignConflict(Foreign::File))
    }
}

/// Absolute target of the symlink at `link`; relative targets are resolved
/// against the link's parent. `.` and `..` are folded out so that a target
/// like `<source>/../elsewhere` is not mistaken for a path under the source.
///
/// # Errors
///
/// Returns an error if `link` is not a readable symlink.
pub fn link_target(link: &Path) -> Result<PathBuf> {
    let raw = std::fs::read_link(link).map_err(|e| SymfarmError::from_io(e, link))?;
    let joined = if raw.is_absolute() {
        raw
    } else {
        link.parent().map_or_else(|| raw.clone(), |p| p.join(&raw))
    };
    Ok(normalize_lexically(&joined))
}

/// Drop `.` components and resolve `..` against the preceding component
/// without touching the filesystem.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` is a symlink into `source_root`.
#[must_use]
pub fn is_link_into(path: &Path, source_root: &Path) -> bool {
    matches!(
        classify(path, source_root),
        Ok(LinkRecord::LinkedToSource { .. })
    )
}

/// Compare two paths for equality, handling UNC prefix normalization on Windows.
#[must_use]
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    let normalize = |p: &Path| -> PathBuf {
        #[cfg(windows)]
        {
            let s = p.to_string_lossy();
            if let Some(stripped) = s.strip_prefix(r"\\?\") {
                return PathBuf::from(stripped);
            }
        }
        p.components().collect()
    };
    normalize(a) == normalize(b)
}

/// Ensure the parent directory of `path` exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SymfarmError::from_io(e, parent))
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Create a symlink at `link` pointing to `target`.
///
/// # Errors
///
/// Returns an error if the link cannot be created.
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target, link);

    #[cfg(windows)]
    let result = if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    };

    result
        .map_err(|e| SymfarmError::from_io(e, link))
        .with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })
}

/// Remove the symlink at `path` without touching its target.
///
/// Directory symlinks on Windows need `remove_dir`, so the raw directory
/// attribute decides which call is used.
///
/// # Errors
///
/// Returns an error if the link cannot be removed.
pub fn remove_symlink(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path)
        .map_err(|e| SymfarmError::from_io(e, path))
        .with_context(|| format!("reading metadata: {}", path.display()))?;
    let result = if is_dir_like(&meta) {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    };
    result
        .map_err(|e| SymfarmError::from_io(e, path))
        .with_context(|| format!("removing symlink: {}", path.display()))
}

fn is_dir_like(meta: &std::fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x10 != 0 // FILE_ATTRIBUTE_DIRECTORY
    }
    #[cfg(not(windows))]
    {
        meta.is_dir()
    }
}

/// Entry names of `dir`, sorted.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn sorted_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)
        .map_err(|e| SymfarmError::from_io(e, dir))
        .with_context(|| format!("reading directory {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("reading entry in {}", dir.display()))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Move `from` to `to`, copying and deleting when a rename would cross
/// filesystems. Symlinks inside a copied tree are recreated, not followed.
///
/// On failure `from` is left in place and any partial copy is removed.
///
/// # Errors
///
/// Returns an error if neither a rename nor a copy succeeds.
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            if let Err(copy_err) = copy_tree(from, to) {
                let _ = remove_tree(to);
                return Err(copy_err)
                    .with_context(|| format!("copying {} to {}", from.display(), to.display()));
            }
            remove_tree(from).with_context(|| format!("removing moved {}", from.display()))
        }
        Err(e) => Err(SymfarmError::from_io(e, from))
            .with_context(|| format!("moving {} to {}", from.display(), to.display())),
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(from).map_err(|e| SymfarmError::from_io(e, from))?;
    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(from).map_err(|e| SymfarmError::from_io(e, from))?;
        create_symlink(&target, to)
    } else if meta.is_dir() {
        std::fs::create_dir_all(to).map_err(|e| SymfarmError::from_io(e, to))?;
        for name in sorted_names(from)? {
            copy_tree(&from.join(&name), &to.join(&name))?;
        }
        Ok(())
    } else {
        std::fs::copy(from, to).map_err(|e| SymfarmError::from_io(e, from))?;
        Ok(())
    }
}

fn remove_tree(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| SymfarmError::from_io(e, path))?;
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| SymfarmError::from_io(e, path))
}

/// Remove `start` and its ancestors while they are empty, stopping at (and
/// never removing) `boundary` or any directory outside it.
///
/// Returns the directories removed.
pub fn prune_empty_dirs(start: &Path, boundary: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir == boundary || !dir.starts_with(boundary) {
            break;
        }
        let empty = std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
        if !empty || std::fs::remove_dir(dir).is_err() {
            break;
        }
        removed.push(dir.to_path_buf());
        current = dir.parent();
    }
    removed
}
