//! Domain-specific error types for the symlink farm.
//!
//! Internal modules return [`anyhow::Result`] and raise a [`SymfarmError`]
//! whenever the failure belongs to the documented taxonomy. The CLI boundary
//! walks the error chain with [`exit_code_for`] to pick the process exit code.
//!
//! # Exit taxonomy
//!
//! ```text
//! 0  success
//! 1  general failure (conflicts, policy violations, push failures, ...)
//! 2  git is not installed
//! 3  the source root is not a git repository
//! 4  the repository has no configured remote
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by the link engine, the sync pipeline and the configuration
/// store.
#[derive(Error, Debug)]
pub enum SymfarmError {
    /// The configuration file is malformed or a required setting is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more destinations are occupied by something the farm does not own.
    #[error("{count} link conflict(s): {}", .paths.join(", "))]
    LinkConflict {
        /// Number of conflicting entries.
        count: usize,
        /// Source-relative paths of the conflicting entries.
        paths: Vec<String>,
    },

    /// The `git` executable could not be found on `PATH`.
    #[error("git is not installed or not on PATH")]
    GitNotInstalled,

    /// The source root is not inside a git work tree.
    #[error("{} is not a git repository", .0.display())]
    NotARepository(PathBuf),

    /// The repository has no remote to push to.
    #[error("repository at {} has no configured remote", .0.display())]
    NoRemote(PathBuf),

    /// A file was added to or removed from a protected directory.
    #[error("file added or removed in no-new-files directory '{prefix}': {path}")]
    NoNewFilesViolation {
        /// Protected prefix from the configuration.
        prefix: String,
        /// Offending source-relative path.
        path: String,
    },

    /// Every push attempt failed with a network error.
    #[error("network error: push failed after {attempts} attempt(s)")]
    PushNetwork {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Push failed for a reason retrying will not fix.
    #[error("push failed: {0}")]
    PushFatal(String),

    /// The filesystem refused access while linking, unlinking or moving.
    #[error("permission denied: {}", .path.display())]
    PermissionDenied {
        /// Path that could not be accessed.
        path: PathBuf,
    },

    /// A command argument was rejected before anything was changed.
    #[error("{0}")]
    InvalidInput(String),
}

impl SymfarmError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::GitNotInstalled => 2,
            Self::NotARepository(_) => 3,
            Self::NoRemote(_) => 4,
            _ => 1,
        }
    }

    /// Wrap an I/O error, promoting `PermissionDenied` to the typed variant.
    #[must_use]
    pub fn from_io(err: std::io::Error, path: &Path) -> anyhow::Error {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.to_path_buf(),
            }
            .into()
        } else {
            anyhow::Error::new(err).context(format!("{}", path.display()))
        }
    }
}

/// Exit code for an arbitrary error chain.
///
/// The first [`SymfarmError`] found in the chain decides; anything else is a
/// general failure.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<SymfarmError>())
        .map_or(1, SymfarmError::exit_code)
}
