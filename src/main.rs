use clap::Parser;
use std::process::ExitCode;

use symfarm_cli::{cli, commands, error, logging};

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    let name = args.command.name();
    logging::init_subscriber(args.verbose, name);
    let log = logging::Logger::new(name);

    match commands::dispatch(&args, &log) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log.error(&format!("{err:#}"));
            if let Some(path) = log.log_path() {
                log.info(&format!("log: {}", path.display()));
            }
            ExitCode::from(error::exit_code_for(&err))
        }
    }
}
