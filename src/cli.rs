//! CLI interface for repo-owners.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod generate;
pub mod resolve;

pub use generate::GenerateCommand;
pub use resolve::ResolveCommand;

/// repo-owners: derives CODEOWNERS from Git history and GitHub identities.
#[derive(Parser)]
#[command(name = "repo-owners")]
#[command(
    about = "Derives per-folder CODEOWNERS from Git history and GitHub identities",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Log filter, e.g. `debug` or `repo_owners=trace` (overrides RUST_LOG).
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Resolves the repository history and writes CODEOWNERS lines.
    Generate(GenerateCommand),
    /// Looks up the GitHub account behind an id, login, e-mail or commit.
    Resolve(ResolveCommand),
}

impl Cli {
    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Generate(generate_cmd) => generate_cmd.execute().await,
            Commands::Resolve(resolve_cmd) => resolve_cmd.execute().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn log_level_is_global() {
        let cli = Cli::parse_from(["repo-owners", "resolve", "octocat", "--log-level", "debug"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Resolve(_)));
    }
}
