//! Hook command — entry points invoked by the installed git hooks.

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::checkout::CheckoutSynchronizer;
use crate::config::Policy;
use crate::error::GuardError;
use crate::git::{Vcs, SKIP_HOOKS_ENV};
use crate::guard::{override_requested, validate_commit, OVERRIDE_ENV};

/// Hook operations.
#[derive(Parser)]
pub struct HookCommand {
    /// Hook to run.
    #[command(subcommand)]
    pub command: HookSubcommands,
}

/// Hook subcommands.
#[derive(Subcommand)]
pub enum HookSubcommands {
    /// Rejects commits of private files on public branches.
    #[command(name = "pre-commit")]
    PreCommit,
    /// Restores private files and refreshes excludes after a branch switch.
    #[command(name = "post-checkout")]
    PostCheckout(PostCheckoutArgs),
}

/// Arguments git passes to post-checkout.
#[derive(Parser)]
pub struct PostCheckoutArgs {
    /// Previous HEAD.
    pub previous: String,
    /// New HEAD.
    pub new: String,
    /// `1` for a branch checkout, `0` for a file checkout.
    pub branch_checkout: String,
}

/// Environment switches the hooks honour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct HookEnv {
    /// `REPOGUARD_SKIP_HOOKS=1`: both hooks do nothing.
    skip: bool,
    /// `REPOGUARD_OVERRIDE`: the pre-commit check is bypassed.
    bypass: bool,
}

impl HookEnv {
    fn from_env() -> Self {
        Self {
            skip: std::env::var(SKIP_HOOKS_ENV).is_ok_and(|value| value == "1"),
            bypass: override_requested(),
        }
    }
}

impl HookSubcommands {
    /// Whether the hook has any work to do under `env`.
    fn is_active(&self, env: HookEnv) -> bool {
        if env.skip {
            return false;
        }
        match self {
            Self::PreCommit => !env.bypass,
            Self::PostCheckout(args) => args.branch_checkout == "1",
        }
    }

    /// Runs an active hook against an opened repository.
    fn run<V: Vcs>(&self, vcs: &V, policy: &Policy) -> Result<()> {
        match self {
            Self::PreCommit => pre_commit(vcs, policy),
            Self::PostCheckout(_) => {
                // A failed sync must never fail the checkout itself.
                if let Err(e) = post_checkout(vcs, policy) {
                    warn_post_checkout(&e);
                }
                Ok(())
            }
        }
    }
}

impl HookCommand {
    /// Executes the hook command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let env = HookEnv::from_env();
        if !self.command.is_active(env) {
            if !env.skip && env.bypass && matches!(self.command, HookSubcommands::PreCommit) {
                eprintln!("⚠️  repoguard: {OVERRIDE_ENV} set; skipping private content check");
            }
            return Ok(());
        }

        match super::open_workspace(config) {
            Ok((repo, policy)) => self.command.run(&repo, &policy),
            Err(e) if matches!(self.command, HookSubcommands::PostCheckout(_)) => {
                warn_post_checkout(&e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn warn_post_checkout(e: &anyhow::Error) {
    warn!(error = %e, "Post-checkout synchronisation failed");
    eprintln!("⚠️  repoguard: {e:#}");
}

fn pre_commit<V: Vcs>(vcs: &V, policy: &Policy) -> Result<()> {
    let check = validate_commit(vcs, policy)?;
    if check.is_ok() {
        return Ok(());
    }

    eprintln!(
        "❌ repoguard: refusing to commit private files to `{}` ({}):",
        check.branch,
        check.classification.label()
    );
    for verdict in &check.violations {
        eprintln!("   - {verdict}");
    }
    eprintln!();
    eprintln!("   Unstage them with `git restore --staged <path>`,");
    eprintln!("   commit them on `{}` instead,", policy.private_branch);
    eprintln!("   or bypass once with `{OVERRIDE_ENV}=1 git commit`.");

    Err(GuardError::CommitBlocked {
        branch: check.branch,
        violations: check.violations,
    }
    .into())
}

fn post_checkout<V: Vcs>(vcs: &V, policy: &Policy) -> Result<()> {
    let Some(branch) = vcs.current_branch()? else {
        return Ok(());
    };

    let report = CheckoutSynchronizer::new(vcs, policy).on_checkout(&branch)?;
    if !report.restored.is_empty() {
        eprintln!(
            "🔍 repoguard: restored {} private file(s) from `{}`",
            report.restored.len(),
            policy.private_branch
        );
    }
    for skipped in &report.skipped {
        eprintln!("⚠️  repoguard: skipped {}: {}", skipped.path, skipped.reason);
    }
    Ok(())
}
