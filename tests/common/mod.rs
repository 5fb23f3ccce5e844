// Shared helpers for integration tests.
//
// Provides a temporary farm (source root plus home directory) and a fluent
// builder so each integration test can set up an isolated environment
// without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use symfarm_cli::config::{ConfigStore, DEFAULT_META_NAME};
use symfarm_cli::farm::{ExclusionFilter, LinkEngine, PathResolver};
use symfarm_cli::sync::{ChangeRecord, PushAttempt, RepositoryGateway};

/// An isolated farm backed by a [`tempfile::TempDir`].
///
/// Layout: `<tmp>/source` is the source root and `<tmp>/home` the home
/// directory that `~` expands to. Both are canonical paths.
pub struct Farm {
    tmp: tempfile::TempDir,
    source: PathBuf,
    home: PathBuf,
}

impl Farm {
    /// Path to the source root.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Path to the home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Absolute path of a source entry.
    pub fn src(&self, rel: &str) -> PathBuf {
        self.source.join(rel)
    }

    /// Absolute path below the home directory.
    pub fn at_home(&self, rel: &str) -> PathBuf {
        self.home.join(rel)
    }

    /// Load the configuration store from the source root.
    pub fn store(&self) -> ConfigStore {
        ConfigStore::load(&self.source.join(DEFAULT_META_NAME), &self.home)
            .expect("load configuration")
    }

    /// Build a link engine from the current configuration on disk.
    pub fn engine(&self) -> LinkEngine {
        let store = self.store();
        let config = store.config();
        LinkEngine::new(
            &self.source,
            PathResolver::from_config(config),
            ExclusionFilter::new(DEFAULT_META_NAME, &config.exclusions),
        )
    }

    /// Every symlink below `dir`, relative to it, sorted.
    pub fn symlinks_under(&self, dir: &Path) -> Vec<String> {
        let mut found = Vec::new();
        collect_symlinks(dir, dir, &mut found);
        found.sort();
        found
    }
}

fn collect_symlinks(base: &Path, dir: &Path, found: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_symlink() {
            let rel = path.strip_prefix(base).expect("below base");
            found.push(rel.to_string_lossy().replace('\\', "/"));
        } else if path.is_dir() {
            collect_symlinks(base, &path, found);
        }
    }
}

/// Fluent builder for [`Farm`].
#[derive(Default)]
pub struct FarmBuilder {
    files: Vec<(String, String)>,
    home_files: Vec<(String, String)>,
    config: Option<String>,
}

impl FarmBuilder {
    /// Create a builder for an empty farm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the source root.
    pub fn file(mut self, rel: &str, content: &str) -> Self {
        self.files.push((rel.to_string(), content.to_string()));
        self
    }

    /// Add a file below the home directory.
    pub fn home_file(mut self, rel: &str, content: &str) -> Self {
        self.home_files.push((rel.to_string(), content.to_string()));
        self
    }

    /// Set the configuration file content.
    pub fn config(mut self, toml: &str) -> Self {
        self.config = Some(toml.to_string());
        self
    }

    /// Create the directories and files.
    pub fn build(self) -> Farm {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let base = dunce::canonicalize(tmp.path()).expect("canonicalize temp dir");
        let source = base.join("source");
        let home = base.join("home");
        std::fs::create_dir_all(&source).expect("create source root");
        std::fs::create_dir_all(&home).expect("create home");

        for (root, files) in [(&source, &self.files), (&home, &self.home_files)] {
            for (rel, content) in files {
                let path = root.join(rel);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).expect("create parent dir");
                }
                std::fs::write(&path, content).expect("write file");
            }
        }

        let config = self.config.unwrap_or_default();
        std::fs::write(source.join(DEFAULT_META_NAME), config).expect("write config");

        Farm { tmp, source, home }
    }
}

/// A [`symfarm_cli::sync::Notifier`] that records every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    /// Messages in the order they were sent.
    pub messages: RefCell<Vec<String>>,
}

impl symfarm_cli::sync::Notifier for RecordingNotifier {
    fn notify(&self, message: &str) -> anyhow::Result<()> {
        self.messages.borrow_mut().push(message.to_string());
        Ok(())
    }
}

/// In-memory [`RepositoryGateway`] with scripted push results.
///
/// Every call is appended to `calls` so tests can assert what the pipeline
/// did and did not do.
#[derive(Debug, Default)]
pub struct FakeGateway {
    pub changes: Vec<ChangeRecord>,
    pub pushes: RefCell<VecDeque<PushAttempt>>,
    pub calls: RefCell<Vec<String>>,
    pub staged: Cell<bool>,
}

impl FakeGateway {
    /// A ready repository reporting `changes`.
    pub fn with_changes(changes: Vec<ChangeRecord>) -> Self {
        Self {
            changes,
            ..Self::default()
        }
    }

    /// Queue push results, consumed one per attempt.
    pub fn pushes(self, results: Vec<PushAttempt>) -> Self {
        *self.pushes.borrow_mut() = results.into();
        self
    }

    /// Recorded calls with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == name).count()
    }

    fn call(&self, name: &str) {
        self.calls.borrow_mut().push(name.to_string());
    }
}

impl RepositoryGateway for FakeGateway {
    fn tool_available(&self) -> bool {
        true
    }

    fn is_repository(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn has_remote(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn changes(&self) -> anyhow::Result<Vec<ChangeRecord>> {
        self.call("changes");
        Ok(self.changes.clone())
    }

    fn stage_all(&self) -> anyhow::Result<()> {
        self.call("stage_all");
        self.staged.set(!self.changes.is_empty());
        Ok(())
    }

    fn has_staged_changes(&self) -> anyhow::Result<bool> {
        Ok(self.staged.get())
    }

    fn commit(&self, _message: &str) -> anyhow::Result<()> {
        self.call("commit");
        Ok(())
    }

    fn push(&self) -> anyhow::Result<PushAttempt> {
        self.call("push");
        Ok(self
            .pushes
            .borrow_mut()
            .pop_front()
            .unwrap_or(PushAttempt::Pushed))
    }
}
