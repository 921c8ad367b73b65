//! Setup command — installs hooks and local excludes.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use crate::guard::hooks::HookAction;
use crate::guard::setup_guardrails;

/// Setup command options.
#[derive(Parser)]
pub struct SetupCommand {
    /// Replace hooks that repoguard did not write.
    #[arg(long)]
    pub force: bool,
}

impl SetupCommand {
    /// Executes the setup command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let program = hook_program();

        let report = setup_guardrails(&repo, &policy, self.force, &program)
            .context("Failed to install guardrails")?;

        for outcome in &report.hooks {
            let name = outcome.hook.file_name();
            match outcome.action {
                HookAction::Installed => println!("✅ Installed {name} hook"),
                HookAction::Updated => println!("✅ Updated {name} hook"),
                HookAction::Replaced => println!("⚠️  Replaced existing {name} hook"),
                HookAction::Skipped => println!(
                    "⚠️  Left existing {name} hook at {} in place (use --force to replace it)",
                    outcome.path.display()
                ),
            }
        }

        let branch = report.branch.as_deref().unwrap_or("HEAD");
        let classification = policy.classifier.classify(branch);
        println!(
            "📊 Branch `{branch}` is {}; local excludes written to {}",
            classification.label(),
            report.exclude_file.display()
        );
        Ok(())
    }
}

/// Command the hooks execute: this binary when its path is known.
fn hook_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.to_str().map(str::to_string))
        .filter(|path| !path.contains('\''))
        .unwrap_or_else(|| "repoguard".to_string())
}
