//! Merge command — merges across the private/public boundary.

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::data::{render, OutputFormat};
use crate::merge::{safe_merge, MergeOutcome, SafeMergeOptions};

/// Merge command options.
#[derive(Parser)]
pub struct MergeCommand {
    /// Branch to merge into the current branch.
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Show what would be merged and excluded without merging.
    #[arg(long)]
    pub preview: bool,

    /// Allow a fast-forward when nothing needs excluding.
    #[arg(long)]
    pub ff: bool,

    /// Stage the merge without committing it.
    #[arg(long)]
    pub no_commit: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl MergeCommand {
    /// Executes the merge command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let options = SafeMergeOptions {
            preview: self.preview,
            no_ff: !self.ff,
            no_commit: self.no_commit,
        };

        let outcome = safe_merge(&repo, &policy, &self.source, options)?;
        if let Some(output) = render(&outcome, self.format)? {
            println!("{output}");
            return Ok(());
        }

        match outcome {
            MergeOutcome::Preview(preview) => {
                println!(
                    "🔍 Merging `{}` into `{}` would bring {} commit(s):",
                    preview.source,
                    preview.target,
                    preview.commits.len()
                );
                for commit in &preview.commits {
                    println!("   {} {}", commit.hash, commit.subject);
                }
                if preview.excluded_paths.is_empty() {
                    println!("✅ Nothing would be excluded");
                } else {
                    println!("⚠️  Excluded from `{}`:", preview.target);
                    for verdict in &preview.excluded_paths {
                        println!("   - {verdict}");
                    }
                }
            }
            MergeOutcome::Merged(report) => {
                for verdict in &report.excluded {
                    println!("   excluded {verdict}");
                }
                if report.committed {
                    println!("✅ Merged `{}` into `{}`", report.source, report.target);
                } else {
                    println!(
                        "✅ Merge of `{}` staged on `{}`; review and commit it",
                        report.source, report.target
                    );
                }
            }
        }
        Ok(())
    }
}
