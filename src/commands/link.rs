//! Command: link every managed entry.
use anyhow::Result;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::error::SymfarmError;
use crate::logging::Log;

/// Run the link command.
///
/// # Errors
///
/// Returns [`SymfarmError::LinkConflict`] after linking everything else if
/// any destination is occupied, or the underlying error if linking fails.
pub fn run(global: &GlobalOpts, log: &dyn Log) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    execute(&setup, log)
}

pub(crate) fn execute(setup: &CommandSetup, log: &dyn Log) -> Result<()> {
    log.stage("Linking");
    let report = setup.engine().link(log)?;
    log.info(&report.to_string());

    if report.conflicts.is_empty() {
        return Ok(());
    }
    for conflict in &report.conflicts {
        log.error(&format!(
            "{} -> {}: {}",
            conflict.rel,
            conflict.destination.display(),
            conflict.reason
        ));
    }
    Err(SymfarmError::LinkConflict {
        count: report.conflicts.len(),
        paths: report.conflicts.iter().map(|c| c.rel.clone()).collect(),
    }
    .into())
}
