//! Line-list editing of the source root's `.gitignore`.
use anyhow::{Context as _, Result};
use std::path::Path;

/// Append `pattern` to the ignore file unless an identical line exists.
///
/// Returns `false` when the pattern was already present.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn add_pattern(path: &Path, pattern: &str) -> Result<bool> {
    let mut lines = read_lines(path)?;
    if lines.iter().any(|l| l.trim() == pattern) {
        return Ok(false);
    }
    lines.push(pattern.to_string());
    write_lines(path, &lines)?;
    Ok(true)
}

/// Remove every line equal to `pattern` from the ignore file.
///
/// Returns `false` when nothing matched.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn remove_pattern(path: &Path, pattern: &str) -> Result<bool> {
    let mut lines = read_lines(path)?;
    let before = lines.len();
    lines.retain(|l| l.trim() != pattern);
    if lines.len() == before {
        return Ok(false);
    }
    write_lines(path, &lines)?;
    Ok(true)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(content.lines().map(String::from).collect())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}
