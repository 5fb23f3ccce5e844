//! Command: print a shell completion script.
use clap::CommandFactory;

use crate::cli::{Cli, CompletionsOpts};

/// Write the completion script for the requested shell to stdout.
pub fn run(opts: &CompletionsOpts) {
    let mut command = Cli::command();
    clap_complete::generate(opts.shell, &mut command, "symfarm", &mut std::io::stdout());
}
