//! Commit-and-push of the source repository with policy gates and retry.
use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::gateway::{ChangeKind, ChangeRecord, PushAttempt, RepositoryGateway};
use super::notify::Notifier;
use crate::config::Config;
use crate::error::SymfarmError;
use crate::farm::{PathPattern, is_under};
use crate::logging::Log;

/// Failure text fragments that mark a push failure as transient.
const NETWORK_MARKERS: [&str; 6] = [
    "could not resolve host",
    "connection timed out",
    "connection refused",
    "failed to connect",
    "network is unreachable",
    "operation timed out",
];

/// How a push run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The working tree was clean.
    NoChanges,
    /// Every change matched a `no-update-on` pattern.
    Exempt,
    /// Staging produced no difference from `HEAD`.
    NothingStaged,
    /// Changes were committed and pushed.
    Pushed {
        /// Attempts used, including the successful one.
        attempts: u32,
    },
}

/// The push pipeline for one source root.
pub struct SyncPipeline<'a> {
    source_root: PathBuf,
    gateway: &'a dyn RepositoryGateway,
    notifier: &'a dyn Notifier,
    no_update_on: Vec<PathPattern>,
    no_new_files: Vec<String>,
    max_attempts: u32,
    retry_delay: Duration,
    sleep: Box<dyn Fn(Duration) + 'a>,
}

impl fmt::Debug for SyncPipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("source_root", &self.source_root)
            .field("no_update_on", &self.no_update_on)
            .field("no_new_files", &self.no_new_files)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl<'a> SyncPipeline<'a> {
    /// Build a pipeline from the farm configuration.
    #[must_use]
    pub fn new(
        source_root: &Path,
        config: &Config,
        gateway: &'a dyn RepositoryGateway,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            gateway,
            notifier,
            no_update_on: config.no_update_on.iter().map(|p| PathPattern::new(p)).collect(),
            no_new_files: config.no_new_files.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the function used to wait between retries.
    #[must_use]
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Run the pipeline once.
    ///
    /// # Errors
    ///
    /// Returns the matching [`SymfarmError`] when a precondition fails, the
    /// no-new-files gate trips, or the push fails; other errors come from the
    /// gateway.
    pub fn run(&self, log: &dyn Log) -> Result<PushOutcome> {
        self.check_preconditions()?;

        let changes = self.gateway.changes()?;
        if changes.is_empty() {
            log.info("nothing to push: working tree clean");
            return Ok(PushOutcome::NoChanges);
        }
        log.debug(&format!("{} changed path(s)", changes.len()));

        if let Some(err) = self.no_new_files_violation(&changes) {
            self.notify(&format!("symfarm: {err}"), log);
            return Err(err.into());
        }

        if self.all_exempt(&changes) {
            log.info("only no-update-on paths changed; skipping push");
            return Ok(PushOutcome::Exempt);
        }

        log.stage("Committing changes");
        self.gateway.stage_all()?;
        if !self.gateway.has_staged_changes()? {
            log.info("nothing staged; skipping push");
            return Ok(PushOutcome::NothingStaged);
        }
        let message = commit_message();
        self.gateway.commit(&message)?;
        log.info(&format!("committed '{message}'"));

        log.stage("Pushing");
        self.push_with_retry(changes.len(), log)
    }

    fn check_preconditions(&self) -> Result<()> {
        if !self.gateway.tool_available() {
            return Err(SymfarmError::GitNotInstalled.into());
        }
        if !self.gateway.is_repository()? {
            return Err(SymfarmError::NotARepository(self.source_root.clone()).into());
        }
        if !self.gateway.has_remote()? {
            return Err(SymfarmError::NoRemote(self.source_root.clone()).into());
        }
        Ok(())
    }

    fn no_new_files_violation(&self, changes: &[ChangeRecord]) -> Option<SymfarmError> {
        self.no_new_files.iter().find_map(|prefix| {
            changes
                .iter()
                .filter(|c| matches!(c.kind, ChangeKind::Added | ChangeKind::Deleted))
                .find(|c| is_under(&c.path, prefix))
                .map(|c| SymfarmError::NoNewFilesViolation {
                    prefix: prefix.trim_end_matches('/').to_string(),
                    path: c.path.clone(),
                })
        })
    }

    fn all_exempt(&self, changes: &[ChangeRecord]) -> bool {
        !self.no_update_on.is_empty()
            && changes
                .iter()
                .all(|c| self.no_update_on.iter().any(|p| p.matches(&c.path)))
    }

    fn push_with_retry(&self, change_count: usize, log: &dyn Log) -> Result<PushOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.gateway.push()? {
                PushAttempt::Pushed => {
                    log.info(&format!("pushed {change_count} change(s)"));
                    self.notify(&format!("symfarm: pushed {change_count} change(s)"), log);
                    return Ok(PushOutcome::Pushed { attempts: attempt });
                }
                PushAttempt::Failed { message } if is_network_error(&message) => {
                    if attempt >= self.max_attempts {
                        let err = SymfarmError::PushNetwork { attempts: attempt };
                        self.notify(&format!("symfarm: {err}"), log);
                        return Err(err.into());
                    }
                    log.warn(&format!(
                        "push attempt {attempt}/{} failed with a network error; retrying in {}ms",
                        self.max_attempts,
                        self.retry_delay.as_millis()
                    ));
                    log.debug(&message);
                    (self.sleep)(self.retry_delay);
                }
                PushAttempt::Failed { message } => {
                    let err = SymfarmError::PushFatal(message);
                    self.notify(&format!("symfarm: {err}"), log);
                    return Err(err.into());
                }
            }
        }
    }

    fn notify(&self, message: &str, log: &dyn Log) {
        if let Err(e) = self.notifier.notify(message) {
            log.warn(&format!("notification failed: {e:#}"));
        }
    }
}

/// Whether a push failure message points at a transient network problem.
#[must_use]
pub fn is_network_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    NETWORK_MARKERS.iter().any(|m| lower.contains(m))
}

fn commit_message() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
