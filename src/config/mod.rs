//! Farm configuration: the `symfarm.toml` file in the source root.
//!
//! [`Config`] is the normalised, read-only view consumed by the link engine
//! and the sync pipeline. [`ConfigStore`] owns the raw TOML document and
//! writes every mutation straight back to disk.

pub mod gitignore;
pub mod store;

pub use store::ConfigStore;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::SymfarmError;

/// Default meta file name inside the source root.
pub const DEFAULT_META_NAME: &str = "symfarm.toml";

/// Placeholder replaced by the message in the notification command.
pub const MESSAGE_PLACEHOLDER: &str = "$!SYM_MESSAGE";

/// Keys under `[general]` that always hold string lists.
pub const LIST_KEYS: [&str; 3] = ["no-sym", "no-update-on", "no-new-files"];

const DEFAULT_RETRY_DELAY_MS: u64 = 6000;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// A configured destination for a relative path or pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    /// Source-relative path or glob pattern (`dir/` and `dir/*` denote directories).
    pub pattern: String,
    /// Absolute destination.
    pub destination: PathBuf,
    /// `true` when the entry lives in `[paths]` (written by `add`).
    pub recorded: bool,
}

/// Normalised configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Default placement root for source entries.
    pub output_root: PathBuf,
    /// `no-sym` exclusion patterns.
    pub exclusions: Vec<String>,
    /// `[paths]` entries followed by `[path_overrides]` entries.
    pub overrides: Vec<Override>,
    /// Patterns whose changes alone never trigger a push.
    pub no_update_on: Vec<String>,
    /// Source-relative prefixes that must not gain or lose files.
    pub no_new_files: Vec<String>,
    /// Shell command template run on push success or failure.
    pub notify_command: Option<String>,
    /// Delay between network retries.
    pub retry_delay: Duration,
    /// Maximum number of push attempts (at least one).
    pub max_attempts: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    general: RawGeneral,
    network: RawNetwork,
    paths: BTreeMap<String, String>,
    path_overrides: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGeneral {
    output_root_target: Option<String>,
    #[serde(rename = "no-sym")]
    no_sym: Vec<String>,
    #[serde(rename = "no-update-on")]
    no_update_on: Vec<String>,
    #[serde(rename = "no-new-files")]
    no_new_files: Vec<String>,
    #[serde(rename = "push-notify-command")]
    push_notify_command: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawNetwork {
    #[serde(rename = "retry-delay-ms")]
    retry_delay_ms: u64,
    #[serde(rename = "max-attempts")]
    max_attempts: u32,
}

impl Default for RawNetwork {
    fn default() -> Self {
        Self {
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Config {
    /// Defaults for an empty configuration file.
    #[must_use]
    pub fn defaults(home: &Path) -> Self {
        Self {
            output_root: home.to_path_buf(),
            exclusions: Vec::new(),
            overrides: Vec::new(),
            no_update_on: Vec::new(),
            no_new_files: Vec::new(),
            notify_command: None,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Normalise a parsed TOML document.
    ///
    /// `~` in destinations expands to `home`.
    ///
    /// # Errors
    ///
    /// Returns [`SymfarmError::Config`] if a value has the wrong type,
    /// `max-attempts` is zero, or a destination is not absolute.
    pub fn from_table(doc: &toml::Table, home: &Path) -> Result<Self, SymfarmError> {
        let raw: RawConfig = toml::Value::Table(doc.clone())
            .try_into()
            .map_err(|e: toml::de::Error| SymfarmError::Config(e.message().to_string()))?;

        if raw.network.max_attempts == 0 {
            return Err(SymfarmError::Config(
                "network.max-attempts must be at least 1".to_string(),
            ));
        }

        let output_root = match raw.general.output_root_target.as_deref() {
            Some(target) => absolute_destination("general.output_root_target", target, home)?,
            None => home.to_path_buf(),
        };

        let mut overrides = Vec::with_capacity(raw.paths.len() + raw.path_overrides.len());
        for (table, recorded, entries) in [
            ("paths", true, &raw.paths),
            ("path_overrides", false, &raw.path_overrides),
        ] {
            for (pattern, destination) in entries {
                let key = format!("{table}.{pattern}");
                overrides.push(Override {
                    pattern: normalize_relative(pattern),
                    destination: absolute_destination(&key, destination, home)?,
                    recorded,
                });
            }
        }

        Ok(Self {
            output_root,
            exclusions: raw.general.no_sym,
            overrides,
            no_update_on: raw.general.no_update_on,
            no_new_files: raw
                .general
                .no_new_files
                .iter()
                .map(|p| normalize_relative(p))
                .collect(),
            notify_command: raw
                .general
                .push_notify_command
                .filter(|c| !c.trim().is_empty()),
            retry_delay: Duration::from_millis(raw.network.retry_delay_ms),
            max_attempts: raw.network.max_attempts,
        })
    }

    /// Literal mapped entries (relative path, destination) that `desym` can
    /// move back out of the farm.
    #[must_use]
    pub fn mappings(&self) -> Vec<(String, PathBuf)> {
        self.overrides
            .iter()
            .filter(|o| o.recorded || !has_glob_meta(&o.pattern))
            .map(|o| {
                let rel = o.pattern.trim_end_matches("/*").trim_end_matches('/');
                (rel.to_string(), o.destination.clone())
            })
            .collect()
    }
}

/// Expand a leading `~` against `home`.
#[must_use]
pub fn expand_tilde(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        home.to_path_buf()
    } else if let Some(rest) = value.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(value)
    }
}

fn absolute_destination(key: &str, value: &str, home: &Path) -> Result<PathBuf, SymfarmError> {
    let path = expand_tilde(value.trim(), home);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(SymfarmError::Config(format!(
            "{key} must be an absolute path (got '{value}')"
        )))
    }
}

/// Strip `./` and surplus separators from a source-relative path.
#[must_use]
pub fn normalize_relative(path: &str) -> String {
    let trimmed = path.trim().replace('\\', "/");
    let trailing = trimmed.ends_with('/');
    let joined = trimmed
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/");
    if trailing && !joined.is_empty() {
        format!("{joined}/")
    } else {
        joined
    }
}

fn has_glob_meta(pattern: &str) -> bool {
    let base = pattern.trim_end_matches("/*");
    base.contains(['*', '?', '['])
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Config, SymfarmError> {
        let doc: toml::Table = src.parse().unwrap();
        Config::from_table(&doc, Path::new("/home/u"))
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::defaults(Path::new("/home/u")));
        assert_eq!(config.retry_delay, Duration::from_millis(6000));
        assert_eq!(config.max_attempts, 10);
    }

    #[test]
    fn general_and_network_sections_are_read() {
        let config = parse(
            r#"
[general]
output_root_target = "~/out"
no-sym = ["*.swp", "secret/"]
no-update-on = ["*.cache"]
no-new-files = ["./private/"]
push-notify-command = "notify-send '$!SYM_MESSAGE'"

[network]
retry-delay-ms = 250
max-attempts = 3
"#,
        )
        .unwrap();
        assert_eq!(config.output_root, PathBuf::from("/home/u/out"));
        assert_eq!(config.exclusions, vec!["*.swp", "secret/"]);
        assert_eq!(config.no_update_on, vec!["*.cache"]);
        assert_eq!(config.no_new_files, vec!["private/"]);
        assert_eq!(
            config.notify_command.as_deref(),
            Some("notify-send '$!SYM_MESSAGE'")
        );
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn both_mapping_tables_are_merged_paths_first() {
        let config = parse(
            r#"
[paths]
config = "/etc/app/config"

[path_overrides]
"nvim/" = "~/.config/nvim"
"#,
        )
        .unwrap();
        assert_eq!(config.overrides.len(), 2);
        assert_eq!(config.overrides[0].pattern, "config");
        assert!(config.overrides[0].recorded);
        assert_eq!(config.overrides[1].pattern, "nvim/");
        assert_eq!(
            config.overrides[1].destination,
            PathBuf::from("/home/u/.config/nvim")
        );
        assert!(!config.overrides[1].recorded);
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let err = parse("[network]\nmax-attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("max-attempts"));
    }

    #[test]
    fn wrong_value_type_is_a_config_error() {
        let err = parse("[network]\nretry-delay-ms = \"soon\"\n").unwrap_err();
        assert!(matches!(err, SymfarmError::Config(_)));
    }

    #[test]
    fn relative_destination_is_rejected() {
        let err = parse("[paths]\nbashrc = \"relative/bashrc\"\n").unwrap_err();
        assert!(err.to_string().contains("paths.bashrc"));
    }

    #[test]
    fn empty_notify_command_is_ignored() {
        let config = parse("[general]\npush-notify-command = \"  \"\n").unwrap();
        assert!(config.notify_command.is_none());
    }

    #[test]
    fn mappings_skip_glob_patterns() {
        let config = parse(
            r#"
[paths]
"group/config" = "/etc/config"

[path_overrides]
"nvim/" = "/home/u/.config/nvim"
"*.lua" = "/home/u/lua"
"#,
        )
        .unwrap();
        let mappings = config.mappings();
        assert_eq!(
            mappings,
            vec![
                ("group/config".to_string(), PathBuf::from("/etc/config")),
                ("nvim".to_string(), PathBuf::from("/home/u/.config/nvim")),
            ]
        );
    }

    #[test]
    fn normalize_relative_cleans_paths() {
        assert_eq!(normalize_relative("./a//b/"), "a/b/");
        assert_eq!(normalize_relative("a\\b"), "a/b");
        assert_eq!(normalize_relative("./"), "");
    }

    #[test]
    fn expand_tilde_only_touches_leading_tilde() {
        let home = Path::new("/home/u");
        assert_eq!(expand_tilde("~", home), PathBuf::from("/home/u"));
        assert_eq!(expand_tilde("~/x", home), PathBuf::from("/home/u/x"));
        assert_eq!(expand_tilde("/a/~", home), PathBuf::from("/a/~"));
    }
}
