use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI entry point for the symlink farm manager.
#[derive(Parser, Debug)]
#[command(
    name = "symfarm",
    about = "Symlink farm manager with git-backed synchronisation",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Source root holding the managed files (default: $SYMFARM_SOURCE or ~/symfarm)
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    /// Name of the configuration file inside the source root (default: $SYMFARM_META_NAME or symfarm.toml)
    #[arg(long, global = true)]
    pub meta_name: Option<String>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create symlinks for every managed entry
    Link,
    /// Remove symlinks that point into the source root
    Unlink(UnlinkOpts),
    /// Commit source root changes and push them
    Push,
    /// Move a path into the source root and link it back
    Add(AddOpts),
    /// Move managed entries back out of the source root
    #[command(alias = "materialize")]
    Desym(DesymOpts),
    /// Add a pattern to the source root .gitignore
    AddToGitIgnore(PatternOpts),
    /// Remove a pattern from the source root .gitignore
    RemoveFromGitIgnore(PatternOpts),
    /// Add a pattern whose changes alone never trigger a push
    AddToNoUpdate(PatternOpts),
    /// Remove a pattern from the no-update-on list
    RemoveFromNoUpdate(PatternOpts),
    /// Protect a directory from gaining or losing files
    AddToNoNewFiles(PatternOpts),
    /// Remove a directory from the no-new-files list
    RemoveFromNoNewFiles(PatternOpts),
    /// Exclude a pattern from linking
    AddToNoSym(PatternOpts),
    /// Remove a pattern from the link exclusions
    RemoveFromNoSym(PatternOpts),
    /// Set a configuration value
    Set(SetOpts),
    /// Print a shell completion script
    Completions(CompletionsOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Subcommand name, used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Unlink(_) => "unlink",
            Self::Push => "push",
            Self::Add(_) => "add",
            Self::Desym(_) => "desym",
            Self::AddToGitIgnore(_) => "add-to-git-ignore",
            Self::RemoveFromGitIgnore(_) => "remove-from-git-ignore",
            Self::AddToNoUpdate(_) => "add-to-no-update",
            Self::RemoveFromNoUpdate(_) => "remove-from-no-update",
            Self::AddToNoNewFiles(_) => "add-to-no-new-files",
            Self::RemoveFromNoNewFiles(_) => "remove-from-no-new-files",
            Self::AddToNoSym(_) => "add-to-no-sym",
            Self::RemoveFromNoSym(_) => "remove-from-no-sym",
            Self::Set(_) => "set",
            Self::Completions(_) => "completions",
            Self::Version => "version",
        }
    }
}

/// Options for the `unlink` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct UnlinkOpts {
    /// Only remove links whose source path matches this pattern
    pub pattern: Option<String>,
}

/// Options for the `add` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct AddOpts {
    /// File or directory to adopt
    pub path: PathBuf,

    /// Subdirectory of the source root to place it under
    pub group: Option<String>,
}

/// Options for the `desym` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct DesymOpts {
    /// Source-relative path or glob of the entries to release
    pub pattern: String,
}

/// A single pattern or path argument.
#[derive(Parser, Debug, Clone)]
pub struct PatternOpts {
    /// Pattern or path
    pub pattern: String,
}

/// Options for the `set` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct SetOpts {
    /// Configuration section (e.g. general, network)
    pub section: String,

    /// Key inside the section
    pub key: String,

    /// One value, or several to store a list
    #[arg(required = true, num_args = 1..)]
    pub values: Vec<String>,
}

/// Options for the `completions` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CompletionsOpts {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_link_with_source() {
        let cli = Cli::parse_from(["symfarm", "--source", "/srv/farm", "link"]);
        assert_eq!(cli.global.source, Some(PathBuf::from("/srv/farm")));
        assert!(matches!(cli.command, Command::Link));
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["symfarm", "push", "-v", "--meta-name", "farm.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.global.meta_name.as_deref(), Some("farm.toml"));
    }

    #[test]
    fn parse_unlink_without_pattern() {
        let cli = Cli::parse_from(["symfarm", "unlink"]);
        assert!(
            matches!(&cli.command, Command::Unlink(opts) if opts.pattern.is_none()),
            "Expected Unlink without pattern"
        );
    }

    #[test]
    fn parse_add_with_group() {
        let cli = Cli::parse_from(["symfarm", "add", "/home/u/.vimrc", "vim"]);
        assert!(
            matches!(&cli.command, Command::Add(_)),
            "Expected Add command"
        );
        if let Command::Add(opts) = cli.command {
            assert_eq!(opts.path, PathBuf::from("/home/u/.vimrc"));
            assert_eq!(opts.group.as_deref(), Some("vim"));
        }
    }

    #[test]
    fn materialize_is_an_alias_for_desym() {
        let cli = Cli::parse_from(["symfarm", "materialize", "vim/*"]);
        assert!(matches!(&cli.command, Command::Desym(opts) if opts.pattern == "vim/*"));
    }

    #[test]
    fn parse_set_with_several_values() {
        let cli = Cli::parse_from(["symfarm", "set", "general", "no-sym", "*.swp", "tmp/"]);
        assert!(
            matches!(&cli.command, Command::Set(_)),
            "Expected Set command"
        );
        if let Command::Set(opts) = cli.command {
            assert_eq!(opts.section, "general");
            assert_eq!(opts.key, "no-sym");
            assert_eq!(opts.values, vec!["*.swp", "tmp/"]);
        }
    }

    #[test]
    fn set_requires_a_value() {
        assert!(Cli::try_parse_from(["symfarm", "set", "network", "max-attempts"]).is_err());
    }

    #[test]
    fn list_editing_commands_use_kebab_case() {
        let cli = Cli::parse_from(["symfarm", "add-to-no-new-files", "private"]);
        assert_eq!(cli.command.name(), "add-to-no-new-files");
        let cli = Cli::parse_from(["symfarm", "remove-from-git-ignore", "*.log"]);
        assert_eq!(cli.command.name(), "remove-from-git-ignore");
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["symfarm", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Command::Completions(CompletionsOpts {
                shell: clap_complete::Shell::Bash
            })
        ));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["symfarm", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }
}
