//! CLI interface for repoguard.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::{GuardConfig, Policy};
use crate::git::{GitRepository, Vcs};

pub mod check;
pub mod history;
pub mod hook;
pub mod merge;
pub mod merge_dev;
pub mod publish;
pub mod restore;
pub mod setup;
pub mod status;
pub mod verify;

/// repoguard: keeps private content out of public git branches.
#[derive(Parser)]
#[command(name = "repoguard")]
#[command(about = "Keeps private content out of public git branches", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file to use instead of the discovered one.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Installs hooks and local excludes in this repository.
    Setup(setup::SetupCommand),
    /// Shows guardrail state for the current checkout.
    Status(status::StatusCommand),
    /// Checks staged files against the current branch.
    Check(check::CheckCommand),
    /// Merges a branch into the current one, stripping private content.
    Merge(merge::MergeCommand),
    /// Merges a development branch according to its history rule.
    #[command(name = "merge-dev")]
    MergeDev(merge_dev::MergeDevCommand),
    /// Derives a clean public branch from the private branch.
    Publish(publish::PublishCommand),
    /// Fails if a branch tracks private content.
    Verify(verify::VerifyCommand),
    /// Copies private-only files into the working tree.
    #[command(name = "restore-private")]
    RestorePrivate(restore::RestoreCommand),
    /// Analyzes or rewrites repository history.
    History(history::HistoryCommand),
    /// Entry points for installed git hooks.
    #[command(hide = true)]
    Hook(hook::HookCommand),
}

impl Cli {
    /// Executes the CLI command.
    pub fn execute(self) -> Result<()> {
        let config = self.config.as_deref();
        match self.command {
            Commands::Setup(cmd) => cmd.execute(config),
            Commands::Status(cmd) => cmd.execute(config),
            Commands::Check(cmd) => cmd.execute(config),
            Commands::Merge(cmd) => cmd.execute(config),
            Commands::MergeDev(cmd) => cmd.execute(config),
            Commands::Publish(cmd) => cmd.execute(config),
            Commands::Verify(cmd) => cmd.execute(config),
            Commands::RestorePrivate(cmd) => cmd.execute(config),
            Commands::History(cmd) => cmd.execute(config),
            Commands::Hook(cmd) => cmd.execute(config),
        }
    }
}

/// Opens the current repository and compiles its configuration.
pub(crate) fn open_workspace(config: Option<&Path>) -> Result<(GitRepository, Policy)> {
    let repo = GitRepository::open()
        .context("Failed to open git repository. Make sure you're in a git repository.")?;
    let policy = load_policy(repo.workdir(), config)?;
    Ok((repo, policy))
}

/// Loads and compiles configuration for the repository at `root`.
pub(crate) fn load_policy(root: &Path, config: Option<&Path>) -> Result<Policy> {
    let (guard_config, source) =
        GuardConfig::load(root, config).context("Failed to load repoguard configuration")?;
    debug!(source = %source, "Using configuration");
    Policy::from_config(&guard_config).context("Invalid repoguard configuration")
}
