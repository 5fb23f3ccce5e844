//! Command: adopt a path into the source root.
use anyhow::{Context as _, Result};

use super::CommandSetup;
use crate::cli::{AddOpts, GlobalOpts};
use crate::logging::Log;

/// Run the add command.
///
/// # Errors
///
/// Returns an error if the path cannot be adopted.
pub fn run(global: &GlobalOpts, opts: &AddOpts, log: &dyn Log) -> Result<()> {
    let mut setup = CommandSetup::init(global, log)?;
    execute(&mut setup, opts, log)
}

pub(crate) fn execute(setup: &mut CommandSetup, opts: &AddOpts, log: &dyn Log) -> Result<()> {
    let path = std::path::absolute(&opts.path)
        .with_context(|| format!("resolving {}", opts.path.display()))?;
    log.stage(&format!("Adding {}", path.display()));
    let engine = setup.engine();
    let added = engine.add(&path, opts.group.as_deref(), &mut setup.store, log)?;
    log.info(&format!(
        "{} is now {}",
        added.destination.display(),
        added.rel
    ));
    Ok(())
}
