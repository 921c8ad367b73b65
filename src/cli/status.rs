//! Status command — reports guardrail state for the current checkout.

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use crate::data::{render, OutputFormat};
use crate::guard::hooks::HookState;
use crate::guard::{check_status, StatusReport};

/// Status command options.
#[derive(Parser)]
pub struct StatusCommand {
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl StatusCommand {
    /// Executes the status command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let report = check_status(&repo, &policy)?;

        match render(&report, self.format)? {
            Some(output) => println!("{output}"),
            None => print_text(&report),
        }
        Ok(())
    }
}

fn print_text(report: &StatusReport) {
    let branch = report.branch.as_deref().unwrap_or("(detached HEAD)");
    println!("📊 Branch: {branch} ({})", report.classification.label());

    for (kind, state) in &report.hooks {
        let line = match state {
            HookState::Managed => "✅ installed",
            HookState::Foreign => "⚠️  foreign hook present",
            HookState::Missing => "❌ missing",
        };
        println!("   {} hook: {line}", kind.file_name());
    }
    let excludes = if report.excludes_configured {
        "✅ configured"
    } else {
        "❌ not configured"
    };
    println!("   local excludes: {excludes}");
    println!("   staged files: {}", report.staged_files.len());

    if report.private_files_staged.is_empty() {
        if report.fully_protected() {
            println!("✅ Guardrails active");
        } else {
            println!("⚠️  Guardrails incomplete; run `repoguard setup`");
        }
    } else {
        println!("❌ Private files staged:");
        for verdict in &report.private_files_staged {
            println!("   - {verdict}");
        }
    }
}
