//! Command: set a single configuration value.
use anyhow::Result;

use super::CommandSetup;
use crate::cli::{GlobalOpts, SetOpts};
use crate::logging::Log;

/// Run the set command.
///
/// # Errors
///
/// Returns an error if the value fails validation or cannot be written.
pub fn run(global: &GlobalOpts, opts: &SetOpts, log: &dyn Log) -> Result<()> {
    let mut setup = CommandSetup::init(global, log)?;
    execute(&mut setup, opts, log)
}

pub(crate) fn execute(setup: &mut CommandSetup, opts: &SetOpts, log: &dyn Log) -> Result<()> {
    setup.store.set(&opts.section, &opts.key, &opts.values)?;
    log.info(&format!(
        "set {}.{} = {}",
        opts.section,
        opts.key,
        opts.values.join(" ")
    ));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::commands::tests::temp_setup;
    use crate::logging::RecordingLog;
    use std::time::Duration;

    fn opts(section: &str, key: &str, values: &[&str]) -> SetOpts {
        SetOpts {
            section: section.to_string(),
            key: key.to_string(),
            values: values.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn integers_update_network_settings() {
        let (_tmp, mut setup) = temp_setup("");
        let log = RecordingLog::new();
        execute(&mut setup, &opts("network", "retry-delay-ms", &["250"]), &log).unwrap();
        execute(&mut setup, &opts("network", "max-attempts", &["2"]), &log).unwrap();
        assert_eq!(setup.store.config().retry_delay, Duration::from_millis(250));
        assert_eq!(setup.store.config().max_attempts, 2);
    }

    #[test]
    fn invalid_value_leaves_file_untouched() {
        let (_tmp, mut setup) = temp_setup("[network]\nmax-attempts = 3\n");
        let before = std::fs::read_to_string(setup.store.path()).unwrap();
        assert!(execute(&mut setup, &opts("network", "max-attempts", &["0"]), &RecordingLog::new()).is_err());
        assert_eq!(std::fs::read_to_string(setup.store.path()).unwrap(), before);
        assert_eq!(setup.store.config().max_attempts, 3);
    }

    #[test]
    fn output_root_accepts_tilde() {
        let (_tmp, mut setup) = temp_setup("");
        execute(
            &mut setup,
            &opts("general", "output_root_target", &["~/dots"]),
            &RecordingLog::new(),
        )
        .unwrap();
        assert_eq!(setup.store.config().output_root, setup.home.join("dots"));
    }
}
