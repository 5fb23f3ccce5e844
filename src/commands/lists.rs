//! Commands: edit the pattern lists kept in the configuration and `.gitignore`.
use anyhow::Result;
use std::path::Path;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::config::{gitignore, normalize_relative};
use crate::error::SymfarmError;
use crate::logging::Log;

/// Which list a command edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Lines of `<source>/.gitignore`.
    GitIgnore,
    /// `[general] no-update-on`.
    NoUpdate,
    /// `[general] no-new-files`.
    NoNewFiles,
    /// `[general] no-sym`.
    NoSym,
}

impl ListKind {
    const fn config_key(self) -> Option<&'static str> {
        match self {
            Self::GitIgnore => None,
            Self::NoUpdate => Some("no-update-on"),
            Self::NoNewFiles => Some("no-new-files"),
            Self::NoSym => Some("no-sym"),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::GitIgnore => ".gitignore",
            Self::NoUpdate => "no-update-on",
            Self::NoNewFiles => "no-new-files",
            Self::NoSym => "no-sym",
        }
    }
}

/// Whether to add or remove the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// Append unless present.
    Add,
    /// Remove if present.
    Remove,
}

/// Run a list-editing command.
///
/// # Errors
///
/// Returns an error if the value is invalid or the file cannot be written.
pub fn run(global: &GlobalOpts, kind: ListKind, edit: Edit, value: &str, log: &dyn Log) -> Result<()> {
    let mut setup = CommandSetup::init(global, log)?;
    execute(&mut setup, kind, edit, value, log)
}

pub(crate) fn execute(
    setup: &mut CommandSetup,
    kind: ListKind,
    edit: Edit,
    value: &str,
    log: &dyn Log,
) -> Result<()> {
    let value = match kind {
        ListKind::NoNewFiles => protected_prefix(value, &setup.source_root)?,
        _ => value.trim().to_string(),
    };
    if value.is_empty() {
        return Err(SymfarmError::InvalidInput("empty pattern".to_string()).into());
    }

    let changed = match (kind.config_key(), edit) {
        (None, Edit::Add) => gitignore::add_pattern(&setup.source_root.join(".gitignore"), &value)?,
        (None, Edit::Remove) => {
            gitignore::remove_pattern(&setup.source_root.join(".gitignore"), &value)?
        }
        (Some(key), Edit::Add) => setup.store.list_add("general", key, &value)?,
        (Some(key), Edit::Remove) => setup.store.list_remove("general", key, &value)?,
    };

    let label = kind.label();
    match (changed, edit) {
        (true, Edit::Add) => log.info(&format!("added '{value}' to {label}")),
        (true, Edit::Remove) => log.info(&format!("removed '{value}' from {label}")),
        (false, Edit::Add) => log.info(&format!("'{value}' is already in {label}")),
        (false, Edit::Remove) => log.warn(&format!("'{value}' is not in {label}")),
    }
    Ok(())
}

/// Normalise a no-new-files argument to a source-relative prefix.
///
/// Absolute paths must lie inside the source root.
fn protected_prefix(value: &str, source_root: &Path) -> Result<String> {
    let path = Path::new(value.trim());
    let rel = if path.is_absolute() {
        let resolved = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let inside = resolved
            .strip_prefix(source_root)
            .or_else(|_| path.strip_prefix(source_root))
            .map_err(|_| {
                SymfarmError::InvalidInput(format!(
                    "{} is not inside the source root {}",
                    path.display(),
                    source_root.display()
                ))
            })?;
        inside.to_string_lossy().into_owned()
    } else {
        value.to_string()
    };
    let rel = normalize_relative(&rel);
    let rel = rel.trim_end_matches('/');
    if rel.split('/').any(|s| s == "..") {
        return Err(SymfarmError::InvalidInput(format!("'{value}' escapes the source root")).into());
    }
    Ok(rel.to_string())
}
