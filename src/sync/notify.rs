//! Push notification hook.
use anyhow::{Result, bail};

use crate::config::MESSAGE_PLACEHOLDER;
use crate::exec::Executor;

/// Receives human-readable push outcomes.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    /// Deliver `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails; callers log and carry on.
    fn notify(&self, message: &str) -> Result<()>;
}

/// Runs the configured shell command template with the message substituted
/// for `$!SYM_MESSAGE`. Does nothing when no template is configured.
#[derive(Debug)]
pub struct ShellNotifier<'a> {
    template: Option<String>,
    exec: &'a dyn Executor,
}

impl<'a> ShellNotifier<'a> {
    /// Create a notifier for an optional command template.
    #[must_use]
    pub fn new(template: Option<&str>, exec: &'a dyn Executor) -> Self {
        Self {
            template: template.map(String::from),
            exec,
        }
    }

    /// The shell command that would run for `message`.
    ///
    /// Single quotes in the message are escaped for use inside a
    /// single-quoted shell word.
    #[must_use]
    pub fn render(&self, message: &str) -> Option<String> {
        let escaped = message.replace('\'', r"'\''");
        self.template
            .as_deref()
            .map(|t| t.replace(MESSAGE_PLACEHOLDER, &escaped))
    }
}

impl Notifier for ShellNotifier<'_> {
    fn notify(&self, message: &str) -> Result<()> {
        let Some(command) = self.render(message) else {
            return Ok(());
        };
        let result = self.exec.run_unchecked("sh", &["-c", &command])?;
        if !result.success {
            bail!(
                "notification command exited with {}: {}",
                result.code.unwrap_or(-1),
                result.stderr.trim()
            );
        }
        Ok(())
    }
}
