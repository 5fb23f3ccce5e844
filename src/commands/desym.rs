//! Command: release managed entries back to their destinations.
use anyhow::{Result, bail};

use super::CommandSetup;
use crate::cli::{DesymOpts, GlobalOpts};
use crate::logging::Log;

/// Run the desym command.
///
/// # Errors
///
/// Returns an error if nothing matches the pattern or any entry could not
/// be restored.
pub fn run(global: &GlobalOpts, opts: &DesymOpts, log: &dyn Log) -> Result<()> {
    let mut setup = CommandSetup::init(global, log)?;
    execute(&mut setup, opts, log)
}

pub(crate) fn execute(setup: &mut CommandSetup, opts: &DesymOpts, log: &dyn Log) -> Result<()> {
    log.stage(&format!("Releasing {}", opts.pattern));
    let engine = setup.engine();
    let mappings = setup.store.config().mappings();
    let report = engine.materialize(&opts.pattern, &mappings, &mut setup.store, log)?;
    log.info(&format!(
        "restored {}, failed {}, pruned {} empty director(ies)",
        report.restored.len(),
        report.failures.len(),
        report.pruned.len()
    ));

    if report.failures.is_empty() {
        return Ok(());
    }
    for (rel, reason) in &report.failures {
        log.error(&format!("{rel}: {reason}"));
    }
    bail!("{} entr(ies) could not be restored", report.failures.len())
}
