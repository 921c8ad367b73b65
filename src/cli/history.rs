//! History commands — analysis and rewriting via git filter-repo.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::data::{render, OutputFormat};
use crate::history::cleaner::{BackupLocation, CleaningConfig, CleaningRecipe, HistoryCleaner};
use crate::utils::TerminalPrompter;

/// History operations.
#[derive(Parser)]
pub struct HistoryCommand {
    /// History subcommand to execute.
    #[command(subcommand)]
    pub command: HistorySubcommands,
}

/// History subcommands.
#[derive(Subcommand)]
pub enum HistorySubcommands {
    /// Lists private and Windows-incompatible paths anywhere in history.
    Analyze(AnalyzeCommand),
    /// Removes paths from every commit on every branch.
    Clean(CleanCommand),
}

impl HistoryCommand {
    /// Executes the history command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        match self.command {
            HistorySubcommands::Analyze(cmd) => cmd.execute(config),
            HistorySubcommands::Clean(cmd) => cmd.execute(config),
        }
    }
}

/// Analyze command options.
#[derive(Parser)]
pub struct AnalyzeCommand {
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl AnalyzeCommand {
    /// Executes the analyze command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let analysis = HistoryCleaner::new(&repo, &policy).analyze_repository()?;
        if let Some(output) = render(&analysis, self.format)? {
            println!("{output}");
            return Ok(());
        }

        println!("📊 Repository history");
        println!("   commits: {}", analysis.commit_count);
        println!("   branches: {}", analysis.branches.join(", "));
        print_paths("🔍 Private paths in history", &analysis.sensitive_paths);
        print_paths("⚠️  Windows-incompatible paths", &analysis.incompatible_paths);
        Ok(())
    }
}

fn print_paths(title: &str, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    println!("{title} ({}):", paths.len());
    for path in paths {
        println!("   - {path}");
    }
}

/// Clean command options.
#[derive(Parser)]
pub struct CleanCommand {
    /// Cleaning scenario.
    #[arg(long, value_enum, default_value_t = CleaningRecipe::PreOpenSource)]
    pub recipe: CleaningRecipe,

    /// Path or glob to remove; repeat for several.
    #[arg(long, value_name = "PATH")]
    pub path: Vec<String>,

    /// Show what would be removed and stop.
    #[arg(long)]
    pub preview: bool,

    /// Run git filter-repo in dry-run mode.
    #[arg(long)]
    pub dry_run: bool,

    /// Proceed with uncommitted changes.
    #[arg(long)]
    pub force: bool,

    /// Directory for the mirror backup.
    #[arg(long, value_name = "DIR")]
    pub backup: Option<PathBuf>,

    /// Skip the mirror backup.
    #[arg(long, conflicts_with = "backup")]
    pub no_backup: bool,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

impl CleanCommand {
    /// Executes the clean command.
    pub fn execute(self, config: Option<&Path>) -> Result<()> {
        let (repo, policy) = super::open_workspace(config)?;
        let cleaner = HistoryCleaner::new(&repo, &policy);
        let backup = match (self.no_backup, self.backup) {
            (true, _) => BackupLocation::Skip,
            (false, Some(path)) => BackupLocation::Path(path),
            (false, None) => BackupLocation::Default,
        };
        let cleaning = CleaningConfig {
            recipe: self.recipe,
            paths_to_remove: self.path,
            backup,
            force: self.force,
            dry_run: self.dry_run,
            assume_yes: self.yes,
        };

        let preview = cleaner.preview_cleaning(&cleaning)?;
        println!("🔍 Recipe: {}", preview.recipe);
        println!(
            "   {} path(s) covering {} file(s) in history",
            preview.paths_to_remove.len(),
            preview.files_to_remove
        );
        for path in &preview.paths_to_remove {
            println!("   - {path}");
        }
        for warning in &preview.warnings {
            println!("⚠️  {warning}");
        }
        if self.preview {
            return Ok(());
        }

        let mut prompter = TerminalPrompter::stdin();
        let report = cleaner.clean_history(&cleaning, &mut prompter)?;
        if let Some(backup) = &report.backup {
            println!("✅ Backup created at {}", backup.display());
        }
        if !report.executed {
            println!("✅ Nothing to remove");
        } else if report.dry_run {
            println!("✅ Dry run finished; history unchanged");
        } else {
            println!("✅ History rewritten");
            println!("⚠️  Force-push every branch and ask collaborators to re-clone");
        }
        Ok(())
    }
}
