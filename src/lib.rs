//! Symlink farm manager.
//!
//! Keeps configuration files in one version-controlled source root and
//! projects them onto their real locations as symlinks. The library is
//! organised into layers:
//!
//! - **[`farm`]**: path resolution, exclusion, and the link engine
//!   (`link`, `unlink`, `add`, `materialize`)
//! - **[`sync`]**: commit-and-push of the source root with policy gates,
//!   network retry and notification
//! - **[`config`]**: the TOML configuration file and `.gitignore` editing
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod farm;
pub mod logging;
pub mod sync;
