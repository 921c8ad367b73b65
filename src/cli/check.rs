//! Check command — validates staged files without committing.

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::error::GuardError;
use crate::guard::validate_commit;

/// Check command options.
#[derive(Parser)]
pub struct CheckCommand {}

impl CheckCommand {
    /// Executes the check command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let check = validate_commit(&repo, &policy)?;

        if check.is_ok() {
            println!(
                "✅ {} staged file(s) may be committed to `{}` ({})",
                check.staged,
                check.branch,
                check.classification.label()
            );
            return Ok(());
        }

        println!("❌ Private files staged for `{}`:", check.branch);
        for verdict in &check.violations {
            println!("   - {verdict}");
        }
        Err(GuardError::CommitBlocked {
            branch: check.branch,
            violations: check.violations,
        }
        .into())
    }
}
