//! Write-through persistence for the farm configuration file.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use super::{Config, LIST_KEYS};
use crate::error::SymfarmError;
use crate::farm::MappingStore;

/// Raw TOML document plus its normalised [`Config`].
///
/// Unknown sections and keys are kept verbatim. Every mutation is
/// validated by re-normalising the document, then written to disk before
/// the call returns.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    home: PathBuf,
    doc: toml::Table,
    config: Config,
}

impl ConfigStore {
    /// Load the configuration at `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: &Path, home: &Path) -> Result<Self> {
        let doc: toml::Table = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            content.parse().map_err(|e: toml::de::Error| {
                SymfarmError::Config(format!("{}: {}", path.display(), e.message()))
            })?
        } else {
            toml::Table::new()
        };
        let config = Config::from_table(&doc, home)?;
        Ok(Self {
            path: path.to_path_buf(),
            home: home.to_path_buf(),
            doc,
            config,
        })
    }

    /// The normalised configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Location of the configuration file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `value` to the list `[section] key` unless already present.
    ///
    /// Returns `false` when the value was already listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key holds a non-list value or the file cannot
    /// be written.
    pub fn list_add(&mut self, section: &str, key: &str, value: &str) -> Result<bool> {
        let mut doc = self.doc.clone();
        let list = list_mut(&mut doc, section, key)?;
        if list.iter().any(|v| v.as_str() == Some(value)) {
            return Ok(false);
        }
        list.push(toml::Value::String(value.to_string()));
        self.commit(doc)?;
        Ok(true)
    }

    /// Remove `value` from the list `[section] key`.
    ///
    /// Returns `false` when the value was not listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key holds a non-list value or the file cannot
    /// be written.
    pub fn list_remove(&mut self, section: &str, key: &str, value: &str) -> Result<bool> {
        let mut doc = self.doc.clone();
        let list = list_mut(&mut doc, section, key)?;
        let before = list.len();
        list.retain(|v| v.as_str() != Some(value));
        if list.len() == before {
            return Ok(false);
        }
        self.commit(doc)?;
        Ok(true)
    }

    /// Set `[section] key` from command-line values.
    ///
    /// A single value becomes an integer or boolean when it parses as one and
    /// a string otherwise. Several values, or any of the known list keys,
    /// become a string array.
    ///
    /// # Errors
    ///
    /// Returns an error if no value is given, the resulting document fails
    /// validation, or the file cannot be written.
    pub fn set(&mut self, section: &str, key: &str, values: &[String]) -> Result<()> {
        let value = match values {
            [] => {
                return Err(SymfarmError::InvalidInput(format!(
                    "no value given for {section}.{key}"
                ))
                .into());
            }
            [single] if !(section == "general" && LIST_KEYS.contains(&key)) => scalar(single),
            many => toml::Value::Array(
                many.iter()
                    .map(|v| toml::Value::String(v.clone()))
                    .collect(),
            ),
        };
        let mut doc = self.doc.clone();
        section_mut(&mut doc, section)?.insert(key.to_string(), value);
        self.commit(doc)
    }

    fn commit(&mut self, doc: toml::Table) -> Result<()> {
        let config = Config::from_table(&doc, &self.home)?;
        let content = toml::to_string(&doc).context("serialising configuration")?;
        std::fs::write(&self.path, content)
            .map_err(|e| SymfarmError::from_io(e, &self.path))
            .with_context(|| format!("writing {}", self.path.display()))?;
        self.doc = doc;
        self.config = config;
        Ok(())
    }
}

impl MappingStore for ConfigStore {
    fn record(&mut self, rel: &str, destination: &Path) -> Result<()> {
        let mut doc = self.doc.clone();
        section_mut(&mut doc, "paths")?.insert(
            rel.to_string(),
            toml::Value::String(destination.to_string_lossy().into_owned()),
        );
        self.commit(doc)
    }

    fn forget(&mut self, rel: &str) -> Result<()> {
        let mut doc = self.doc.clone();
        let mut removed = false;
        for table in ["paths", "path_overrides"] {
            if let Some(toml::Value::Table(entries)) = doc.get_mut(table) {
                for key in [rel.to_string(), format!("{rel}/"), format!("{rel}/*")] {
                    removed |= entries.remove(&key).is_some();
                }
            }
        }
        if removed {
            self.commit(doc)?;
        }
        Ok(())
    }
}

fn scalar(value: &str) -> toml::Value {
    if let Ok(n) = value.parse::<i64>() {
        toml::Value::Integer(n)
    } else if let Ok(b) = value.parse::<bool>() {
        toml::Value::Boolean(b)
    } else {
        toml::Value::String(value.to_string())
    }
}

fn section_mut<'a>(doc: &'a mut toml::Table, section: &str) -> Result<&'a mut toml::Table> {
    match doc
        .entry(section.to_string())
        .or_insert_with(|| toml::Value::Table(toml::Table::new()))
    {
        toml::Value::Table(table) => Ok(table),
        _ => Err(SymfarmError::Config(format!("'{section}' is not a table")).into()),
    }
}

fn list_mut<'a>(
    doc: &'a mut toml::Table,
    section: &str,
    key: &str,
) -> Result<&'a mut Vec<toml::Value>> {
    match section_mut(doc, section)?
        .entry(key.to_string())
        .or_insert_with(|| toml::Value::Array(Vec::new()))
    {
        toml::Value::Array(list) => Ok(list),
        _ => Err(SymfarmError::Config(format!("{section}.{key} is not a list")).into()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store_with(content: Option<&str>) -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symfarm.toml");
        if let Some(content) = content {
            std::fs::write(&path, content).unwrap();
        }
        let store = ConfigStore::load(&path, Path::new("/home/u")).unwrap();
        (dir, store)
    }

    fn reload(store: &ConfigStore) -> ConfigStore {
        ConfigStore::load(store.path(), Path::new("/home/u")).unwrap()
    }

    #[test]
    fn missing_file_loads_defaults_without_creating_it() {
        let (_dir, store) = store_with(None);
        assert_eq!(store.config().max_attempts, 10);
        assert!(!store.path().exists());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symfarm.toml");
        std::fs::write(&path, "[general\n").unwrap();
        let err = ConfigStore::load(&path, Path::new("/home/u")).unwrap_err();
        assert!(err.downcast_ref::<SymfarmError>().is_some());
    }

    #[test]
    fn list_add_is_written_through_and_deduplicated() {
        let (_dir, mut store) = store_with(None);
        assert!(store.list_add("general", "no-sym", "*.swp").unwrap());
        assert!(!store.list_add("general", "no-sym", "*.swp").unwrap());
        assert_eq!(reload(&store).config().exclusions, vec!["*.swp"]);
    }

    #[test]
    fn list_remove_reports_absent_values() {
        let (_dir, mut store) = store_with(Some("[general]\nno-update-on = [\"*.cache\", \"*.log\"]\n"));
        assert!(store.list_remove("general", "no-update-on", "*.cache").unwrap());
        assert!(!store.list_remove("general", "no-update-on", "*.cache").unwrap());
        assert_eq!(reload(&store).config().no_update_on, vec!["*.log"]);
    }

    #[test]
    fn list_add_on_scalar_key_fails() {
        let (_dir, mut store) = store_with(Some("[general]\npush-notify-command = \"true\"\n"));
        assert!(store.list_add("general", "push-notify-command", "x").is_err());
    }

    #[test]
    fn set_single_value_infers_integer() {
        let (_dir, mut store) = store_with(None);
        store
            .set("network", "retry-delay-ms", &["250".to_string()])
            .unwrap();
        assert_eq!(
            reload(&store).config().retry_delay,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn set_list_key_with_single_value_stores_array() {
        let (_dir, mut store) = store_with(None);
        store
            .set("general", "no-new-files", &["private".to_string()])
            .unwrap();
        assert_eq!(reload(&store).config().no_new_files, vec!["private"]);
    }

    #[test]
    fn set_multiple_values_stores_array() {
        let (_dir, mut store) = store_with(None);
        store
            .set(
                "general",
                "no-update-on",
                &["*.cache".to_string(), "*.tmp".to_string()],
            )
            .unwrap();
        assert_eq!(store.config().no_update_on, vec!["*.cache", "*.tmp"]);
    }

    #[test]
    fn set_rejects_invalid_result_and_keeps_file() {
        let (_dir, mut store) = store_with(Some("[network]\nmax-attempts = 3\n"));
        assert!(
            store
                .set("network", "max-attempts", &["0".to_string()])
                .is_err()
        );
        assert_eq!(store.config().max_attempts, 3);
        assert_eq!(reload(&store).config().max_attempts, 3);
    }

    #[test]
    fn set_without_values_is_invalid_input() {
        let (_dir, mut store) = store_with(None);
        let err = store.set("general", "x", &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SymfarmError>(),
            Some(SymfarmError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_keys_survive_rewrites() {
        let (_dir, mut store) = store_with(Some("[extra]\nkeep = \"me\"\n"));
        store.list_add("general", "no-sym", "x").unwrap();
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("keep = \"me\""), "{content}");
    }

    #[test]
    fn record_and_forget_mapping() {
        let (_dir, mut store) = store_with(None);
        store
            .record("group/config", Path::new("/etc/app/config"))
            .unwrap();
        assert_eq!(
            reload(&store).config().mappings(),
            vec![("group/config".to_string(), PathBuf::from("/etc/app/config"))]
        );
        store.forget("group/config").unwrap();
        assert!(reload(&store).config().mappings().is_empty());
    }

    #[test]
    fn forget_removes_directory_override_keys() {
        let (_dir, mut store) = store_with(Some("[path_overrides]\n\"nvim/\" = \"/home/u/.config/nvim\"\n"));
        store.forget("nvim").unwrap();
        assert!(store.config().overrides.is_empty());
    }
}
