//! Merge-dev command — squashes or preserves development branch history.

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::data::{render, OutputFormat};
use crate::history::{safe_merge_dev, MergeAction, MergeDevOptions};
use crate::utils::TerminalPrompter;

/// Merge-dev command options.
#[derive(Parser)]
pub struct MergeDevCommand {
    /// Development branch to merge.
    #[arg(value_name = "BRANCH")]
    pub branch: String,

    /// Branch to merge into (defaults to the current branch).
    #[arg(long)]
    pub target: Option<String>,

    /// Squash regardless of the branch rule.
    #[arg(long, conflicts_with = "no_squash")]
    pub squash: bool,

    /// Preserve history regardless of the branch rule.
    #[arg(long)]
    pub no_squash: bool,

    /// Squash commit message to use instead of the synthesized one.
    #[arg(short, long)]
    pub message: Option<String>,

    /// Show the plan without merging.
    #[arg(long)]
    pub dry_run: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl MergeDevCommand {
    /// Executes the merge-dev command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let squash = match (self.squash, self.no_squash) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        let options = MergeDevOptions {
            target: self.target,
            squash,
            message: self.message,
            dry_run: self.dry_run,
        };

        let mut prompter = TerminalPrompter::stdin();
        let report = safe_merge_dev(&repo, &policy, &self.branch, &options, &mut prompter)?;
        if let Some(output) = render(&report, self.format)? {
            println!("{output}");
            return Ok(());
        }

        let plan = &report.plan;
        match report.performed {
            None if plan.commits.is_empty() => {
                println!("✅ `{}` has nothing to merge into `{}`", plan.branch, plan.target);
            }
            None => {
                println!("🔍 Dry run\n");
                println!("{}", plan.render());
            }
            Some(MergeAction::Squash) => println!(
                "✅ Squashed {} commit(s) from `{}` into `{}`",
                plan.commits.len(),
                plan.branch,
                plan.target
            ),
            Some(action) => println!(
                "✅ Merged `{}` into `{}` ({})",
                plan.branch,
                plan.target,
                action.as_str()
            ),
        }
        Ok(())
    }
}
