pub mod add;
pub mod completions;
pub mod desym;
pub mod link;
pub mod lists;
pub mod push;
pub mod set;
pub mod unlink;
pub mod version;

use anyhow::{Context as _, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::config::{ConfigStore, DEFAULT_META_NAME};
use crate::error::SymfarmError;
use crate::farm::{ExclusionFilter, LinkEngine, PathResolver};
use crate::logging::Log;
use lists::{Edit, ListKind};

/// Environment variable naming the source root.
pub const SOURCE_ENV: &str = "SYMFARM_SOURCE";

/// Environment variable naming the configuration file.
pub const META_NAME_ENV: &str = "SYMFARM_META_NAME";

/// Shared state produced by the common command setup sequence.
///
/// Resolves the home directory, the source root and the configuration file
/// once so that each command does not have to repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Home directory of the invoking user.
    pub home: PathBuf,
    /// Canonical source root.
    pub source_root: PathBuf,
    /// Configuration file name inside the source root.
    pub meta_name: String,
    /// Loaded configuration.
    pub store: ConfigStore,
}

impl CommandSetup {
    /// Resolve paths from flags and environment, then load the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory is unknown, the source root
    /// cannot be created, or the configuration fails to parse.
    pub fn init(global: &GlobalOpts, log: &dyn Log) -> Result<Self> {
        let home = home_from(
            std::env::var("SUDO_USER").ok().as_deref(),
            std::env::var_os("HOME"),
        )?;
        let source_root = source_root_from(
            global.source.as_deref(),
            std::env::var_os(SOURCE_ENV),
            &home,
        );
        let meta_name = global
            .meta_name
            .clone()
            .or_else(|| std::env::var(META_NAME_ENV).ok())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_META_NAME.to_string());
        Self::new(&home, &source_root, &meta_name, log)
    }

    /// Load the configuration for an explicit home, source root and meta name.
    ///
    /// The source root is created when missing and canonicalised.
    ///
    /// # Errors
    ///
    /// Returns an error if the source root cannot be created or the
    /// configuration fails to parse.
    pub fn new(home: &Path, source_root: &Path, meta_name: &str, log: &dyn Log) -> Result<Self> {
        if !source_root.exists() {
            log.info(&format!("creating source root {}", source_root.display()));
            std::fs::create_dir_all(source_root)
                .map_err(|e| SymfarmError::from_io(e, source_root))?;
        }
        let source_root = dunce::canonicalize(source_root)
            .with_context(|| format!("resolving {}", source_root.display()))?;
        log.debug(&format!("source root: {}", source_root.display()));

        let config_path = source_root.join(meta_name);
        let store = ConfigStore::load(&config_path, home)?;
        let config = store.config();
        log.debug(&format!("output root: {}", config.output_root.display()));
        log.debug(&format!("{} override(s)", config.overrides.len()));
        log.debug(&format!("{} exclusion(s)", config.exclusions.len()));

        Ok(Self {
            home: home.to_path_buf(),
            source_root,
            meta_name: meta_name.to_string(),
            store,
        })
    }

    /// Link engine for the current configuration.
    #[must_use]
    pub fn engine(&self) -> LinkEngine {
        let config = self.store.config();
        LinkEngine::new(
            &self.source_root,
            PathResolver::from_config(config),
            ExclusionFilter::new(&self.meta_name, &config.exclusions),
        )
    }
}

/// Run the subcommand selected on the command line.
///
/// # Errors
///
/// Returns whatever the subcommand returns.
pub fn dispatch(cli: &Cli, log: &dyn Log) -> Result<()> {
    let global = &cli.global;
    match &cli.command {
        Command::Link => link::run(global, log),
        Command::Unlink(opts) => unlink::run(global, opts, log),
        Command::Push => push::run(global, log),
        Command::Add(opts) => add::run(global, opts, log),
        Command::Desym(opts) => desym::run(global, opts, log),
        Command::AddToGitIgnore(opts) => {
            lists::run(global, ListKind::GitIgnore, Edit::Add, &opts.pattern, log)
        }
        Command::RemoveFromGitIgnore(opts) => {
            lists::run(global, ListKind::GitIgnore, Edit::Remove, &opts.pattern, log)
        }
        Command::AddToNoUpdate(opts) => {
            lists::run(global, ListKind::NoUpdate, Edit::Add, &opts.pattern, log)
        }
        Command::RemoveFromNoUpdate(opts) => {
            lists::run(global, ListKind::NoUpdate, Edit::Remove, &opts.pattern, log)
        }
        Command::AddToNoNewFiles(opts) => {
            lists::run(global, ListKind::NoNewFiles, Edit::Add, &opts.pattern, log)
        }
        Command::RemoveFromNoNewFiles(opts) => {
            lists::run(global, ListKind::NoNewFiles, Edit::Remove, &opts.pattern, log)
        }
        Command::AddToNoSym(opts) => {
            lists::run(global, ListKind::NoSym, Edit::Add, &opts.pattern, log)
        }
        Command::RemoveFromNoSym(opts) => {
            lists::run(global, ListKind::NoSym, Edit::Remove, &opts.pattern, log)
        }
        Command::Set(opts) => set::run(global, opts, log),
        Command::Completions(opts) => {
            completions::run(opts);
            Ok(())
        }
        Command::Version => {
            version::run();
            Ok(())
        }
    }
}

/// Home directory of the invoking user.
///
/// Under `sudo` this is the home of `SUDO_USER`, not root's.
fn home_from(sudo_user: Option<&str>, home: Option<OsString>) -> Result<PathBuf> {
    match sudo_user.filter(|u| !u.is_empty()) {
        Some("root") => Ok(PathBuf::from("/root")),
        Some(user) => Ok(Path::new("/home").join(user)),
        None => home
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| SymfarmError::Config("HOME is not set".to_string()).into()),
    }
}

fn source_root_from(flag: Option<&Path>, env: Option<OsString>, home: &Path) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| home.join("symfarm"))
}
