//! Restore-private command — copies private-only files into the working tree.

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::checkout::CheckoutSynchronizer;

/// Restore-private command options.
#[derive(Parser)]
pub struct RestoreCommand {}

impl RestoreCommand {
    /// Executes the restore-private command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let (restored, skipped) = CheckoutSynchronizer::new(&repo, &policy).restore_private_files()?;

        for path in &restored {
            println!("   restored {path}");
        }
        for entry in &skipped {
            println!("⚠️  Skipped {}: {}", entry.path, entry.reason);
        }
        println!(
            "✅ Restored {} file(s) from `{}`",
            restored.len(),
            policy.private_branch
        );
        Ok(())
    }
}
