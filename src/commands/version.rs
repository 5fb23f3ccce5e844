//! Command: print version information.

/// Print the symfarm version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    let version = option_env!("SYMFARM_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    println!("symfarm {version}");
}
