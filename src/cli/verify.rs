//! Verify command — checks that a branch tracks no private content.

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::data::{render, OutputFormat};
use crate::partition::BranchPartitioner;

/// Verify command options.
#[derive(Parser)]
pub struct VerifyCommand {
    /// Branch to verify.
    #[arg(value_name = "BRANCH")]
    pub branch: String,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl VerifyCommand {
    /// Executes the verify command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let report = BranchPartitioner::new(&repo, &policy).verify(&self.branch)?;

        match render(&report, self.format)? {
            Some(output) => println!("{output}"),
            None if report.is_clean() => println!(
                "✅ `{}` is clean ({} tracked file(s) checked)",
                report.branch, report.tracked_files
            ),
            None => {
                println!("❌ `{}` tracks private content:", report.branch);
                for verdict in &report.violations {
                    println!("   - {verdict}");
                }
            }
        }
        report.into_result()?;
        Ok(())
    }
}
