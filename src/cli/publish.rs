//! Publish command — derives a clean public branch from the private branch.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use crate::data::{render, OutputFormat};
use crate::git::{GitRepository, Vcs};
use crate::partition::BranchPartitioner;

/// Publish command options.
#[derive(Parser)]
pub struct PublishCommand {
    /// Public branch to create or refresh.
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Branch to derive from (defaults to the configured private branch).
    #[arg(long)]
    pub source: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl PublishCommand {
    /// Executes the publish command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        // Our own checkouts and commits must not re-enter the installed hooks.
        let repo = GitRepository::open()
            .context("Failed to open git repository. Make sure you're in a git repository.")?
            .with_hooks_disabled();
        let policy = super::load_policy(repo.workdir(), config)?;
        let source = self.source.unwrap_or_else(|| policy.private_branch.clone());

        let report = BranchPartitioner::new(&repo, &policy)
            .create_clean_public_branch(&self.target, &source)?;
        if let Some(output) = render(&report, self.format)? {
            println!("{output}");
            return Ok(());
        }

        let short = report
            .source_commit
            .get(..crate::git::SHORT_HASH_LEN)
            .unwrap_or(&report.source_commit);
        println!("🔍 Derived `{}` from `{}` at {short}", report.target, report.source);
        for verdict in &report.removed {
            println!("   removed {verdict}");
        }
        match (&report.commit, report.reused_previous) {
            (_, true) => println!("✅ `{}` was already up to date", report.target),
            (Some(commit), false) => println!(
                "✅ Committed {} on `{}`",
                commit.get(..crate::git::SHORT_HASH_LEN).unwrap_or(commit),
                report.target
            ),
            (None, false) => println!("✅ Nothing to remove from `{}`", report.target),
        }
        println!(
            "✅ Verified {} tracked file(s); no private content on `{}`",
            report.verification.tracked_files, report.target
        );
        Ok(())
    }
}
