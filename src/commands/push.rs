//! Command: commit and push source root changes.
use anyhow::Result;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::exec::SystemExecutor;
use crate::logging::Log;
use crate::sync::{GitGateway, PushOutcome, ShellNotifier, SyncPipeline};

/// Run the push command.
///
/// # Errors
///
/// Returns an error if a precondition fails, a policy gate trips, or the
/// push fails.
pub fn run(global: &GlobalOpts, log: &dyn Log) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;
    let config = setup.store.config();
    let exec = SystemExecutor;
    let gateway = GitGateway::new(&setup.source_root, &exec);
    let notifier = ShellNotifier::new(config.notify_command.as_deref(), &exec);

    log.stage("Checking repository");
    let outcome = SyncPipeline::new(&setup.source_root, config, &gateway, &notifier).run(log)?;
    if let PushOutcome::Pushed { attempts } = outcome {
        log.debug(&format!("push succeeded after {attempts} attempt(s)"));
    }
    Ok(())
}
