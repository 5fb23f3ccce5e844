//! Command: remove links pointing into the source root.
use anyhow::Result;

use super::CommandSetup;
use crate::cli::{GlobalOpts, UnlinkOpts};
use crate::logging::Log;

/// Run the unlink command.
///
/// # Errors
///
/// Returns an error if setup fails or a link cannot be removed.
pub fn run(global: &GlobalOpts, opts: &UnlinkOpts, log: &dyn Log) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    log.stage("Unlinking");
    let report = setup.engine().unlink(opts.pattern.as_deref(), log)?;
    log.info(&format!(
        "unlinked {}, pruned {} empty director(ies)",
        report.removed.len(),
        report.pruned.len()
    ));
    Ok(())
}
