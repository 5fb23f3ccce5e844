//! Version-control access for the sync pipeline.
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use crate::exec::Executor;

/// How a path changed in the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Untracked or newly added.
    Added,
    /// Tracked and changed.
    Modified,
    /// Removed from the working tree or index.
    Deleted,
}

/// One changed path, relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Source-relative path using `/` separators.
    pub path: String,
    /// Classification of the change.
    pub kind: ChangeKind,
}

impl ChangeRecord {
    /// Convenience constructor.
    #[must_use]
    pub fn new(path: &str, kind: ChangeKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
        }
    }
}

/// Result of a single push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAttempt {
    /// The remote accepted the push.
    Pushed,
    /// The push failed; `message` holds the tool's output.
    Failed {
        /// Combined error output of the failed push.
        message: String,
    },
}

/// Queries and mutations of the repository holding the source root.
#[cfg_attr(test, mockall::automock)]
pub trait RepositoryGateway {
    /// Whether the version-control tool is installed.
    fn tool_available(&self) -> bool;

    /// Whether the source root is inside a repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be run.
    fn is_repository(&self) -> Result<bool>;

    /// Whether the repository has at least one remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be run.
    fn has_remote(&self) -> Result<bool>;

    /// Current working-tree changes.
    ///
    /// # Errors
    ///
    /// Returns an error if status cannot be read.
    fn changes(&self) -> Result<Vec<ChangeRecord>>;

    /// Stage every change.
    ///
    /// # Errors
    ///
    /// Returns an error if staging fails.
    fn stage_all(&self) -> Result<()>;

    /// Whether the index differs from `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be compared.
    fn has_staged_changes(&self) -> Result<bool>;

    /// Commit the index with `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    fn commit(&self, message: &str) -> Result<()>;

    /// Push once to the default remote.
    ///
    /// # Errors
    ///
    /// Returns an error only if the tool cannot be run; a rejected push is
    /// reported as [`PushAttempt::Failed`].
    fn push(&self) -> Result<PushAttempt>;
}

/// [`RepositoryGateway`] driving the `git` command line.
#[derive(Debug)]
pub struct GitGateway<'a> {
    root: PathBuf,
    exec: &'a dyn Executor,
}

impl<'a> GitGateway<'a> {
    /// Gateway for the repository containing `root`.
    #[must_use]
    pub fn new(root: &Path, exec: &'a dyn Executor) -> Self {
        Self {
            root: root.to_path_buf(),
            exec,
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        Ok(self.exec.run_in(&self.root, "git", args)?.stdout)
    }
}

impl RepositoryGateway for GitGateway<'_> {
    fn tool_available(&self) -> bool {
        self.exec.which("git")
    }

    fn is_repository(&self) -> Result<bool> {
        let result =
            self.exec
                .run_in_unchecked(&self.root, "git", &["rev-parse", "--is-inside-work-tree"])?;
        Ok(result.success && result.stdout.trim() == "true")
    }

    fn has_remote(&self) -> Result<bool> {
        Ok(!self.git(&["remote"])?.trim().is_empty())
    }

    fn changes(&self) -> Result<Vec<ChangeRecord>> {
        let prefix = self.git(&["rev-parse", "--show-prefix"])?;
        let status = self.git(&["status", "--porcelain", "-z", "--untracked-files=all", "--", "."])?;
        Ok(parse_porcelain(&status, prefix.trim()))
    }

    fn stage_all(&self) -> Result<()> {
        self.git(&["add", "-A", "--", "."]).map(drop)
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let result = self
            .exec
            .run_in_unchecked(&self.root, "git", &["diff", "--cached", "--quiet"])?;
        match result.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => bail!("git diff --cached failed: {}", result.stderr.trim()),
        }
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "-m", message]).map(drop)
    }

    fn push(&self) -> Result<PushAttempt> {
        let result = self.exec.run_in_unchecked(&self.root, "git", &["push"])?;
        if result.success {
            Ok(PushAttempt::Pushed)
        } else {
            let message = format!("{}\n{}", result.stderr.trim(), result.stdout.trim());
            Ok(PushAttempt::Failed {
                message: message.trim().to_string(),
            })
        }
    }
}

/// Parse `git status --porcelain -z` output.
///
/// Paths are repository-relative; `prefix` (from `--show-prefix`) is stripped
/// so results are relative to the source root. A rename yields the new path
/// as added and the old path as deleted.
#[must_use]
pub fn parse_porcelain(output: &str, prefix: &str) -> Vec<ChangeRecord> {
    let strip = |path: &str| path.strip_prefix(prefix).unwrap_or(path).to_string();
    let mut records = Vec::new();
    let mut fields = output.split('\0').filter(|f| !f.is_empty());
    while let Some(entry) = fields.next() {
        let (Some(code), Some(path)) = (entry.get(..2), entry.get(3..)) else {
            continue;
        };
        let path = strip(path);
        if code.contains(['R', 'C']) {
            let original = fields.next().map(strip);
            records.push(ChangeRecord { path, kind: ChangeKind::Added });
            if code.contains('R')
                && let Some(original) = original
            {
                records.push(ChangeRecord {
                    path: original,
                    kind: ChangeKind::Deleted,
                });
            }
            continue;
        }
        records.push(ChangeRecord {
            path,
            kind: classify_code(code),
        });
    }
    records
}

fn classify_code(code: &str) -> ChangeKind {
    if code == "??" || code.contains('A') {
        ChangeKind::Added
    } else if code.contains('D') {
        ChangeKind::Deleted
    } else {
        ChangeKind::Modified
    }
}
