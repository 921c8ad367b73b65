//! History rewriting through `git filter-repo`.
//!
//! repoguard never rewrites history itself. It works out which paths to drop,
//! takes a mirror backup, and hands the path list to `git filter-repo`.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Local;
use clap::ValueEnum;
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Policy;
use crate::error::{GuardError, Result};
use crate::git::Vcs;
use crate::utils::prompt::{confirm, Prompter};

/// Base names Windows reserves for devices.
const WINDOWS_RESERVED: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Branch count above which a preview warns that every branch is rewritten.
const MANY_BRANCHES: usize = 5;

/// Pre-built cleaning scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CleaningRecipe {
    /// Drop the configured private paths before publishing.
    PreOpenSource,
    /// Drop files whose names Windows cannot check out.
    WindowsSafe,
    /// Drop user-supplied paths.
    Custom,
    /// Reserved: redact secrets from file contents.
    RemoveSecrets,
    /// Reserved: drop history before a date.
    CutoffDate,
}

impl CleaningRecipe {
    /// Kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreOpenSource => "pre-open-source",
            Self::WindowsSafe => "windows-safe",
            Self::Custom => "custom",
            Self::RemoveSecrets => "remove-secrets",
            Self::CutoffDate => "cutoff-date",
        }
    }
}

impl fmt::Display for CleaningRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the pre-rewrite backup goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackupLocation {
    /// `<repo>_backup_<timestamp>` next to the repository.
    #[default]
    Default,
    /// An explicit directory.
    Path(PathBuf),
    /// No backup.
    Skip,
}

/// A cleaning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleaningConfig {
    /// Scenario to run.
    pub recipe: CleaningRecipe,
    /// Paths to drop; replaces the recipe's defaults when non-empty.
    pub paths_to_remove: Vec<String>,
    /// Backup destination.
    pub backup: BackupLocation,
    /// Proceed despite uncommitted changes.
    pub force: bool,
    /// Let filter-repo report without rewriting.
    pub dry_run: bool,
    /// Skip the confirmation prompt.
    pub assume_yes: bool,
}

impl CleaningConfig {
    /// A request for `recipe` with default settings.
    pub fn new(recipe: CleaningRecipe) -> Self {
        Self {
            recipe,
            paths_to_remove: Vec::new(),
            backup: BackupLocation::Default,
            force: false,
            dry_run: false,
            assume_yes: false,
        }
    }
}

/// Findings of [`HistoryCleaner::analyze_repository`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryAnalysis {
    /// Commits reachable from any ref.
    pub commit_count: usize,
    /// Local branches.
    pub branches: Vec<String>,
    /// Historical paths matching a cleaner private path.
    pub sensitive_paths: Vec<String>,
    /// Historical paths Windows cannot check out.
    pub incompatible_paths: Vec<String>,
}

/// What a cleaning run would do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleaningPreview {
    /// Scenario.
    pub recipe: CleaningRecipe,
    /// Paths handed to filter-repo.
    pub paths_to_remove: Vec<String>,
    /// Historical files those paths cover.
    pub files_to_remove: usize,
    /// Things worth knowing first.
    pub warnings: Vec<String>,
}

/// What a cleaning run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    /// Scenario.
    pub recipe: CleaningRecipe,
    /// Paths handed to filter-repo.
    pub paths_removed: Vec<String>,
    /// Backup location, if one was taken.
    pub backup: Option<PathBuf>,
    /// Whether filter-repo ran in dry-run mode.
    pub dry_run: bool,
    /// Whether filter-repo was run at all.
    pub executed: bool,
}

/// How to invoke `git filter-repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRepo {
    /// Program to run.
    pub program: String,
    /// Arguments placed before the filter options.
    pub prefix_args: Vec<String>,
}

impl Default for FilterRepo {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            prefix_args: vec!["filter-repo".to_string()],
        }
    }
}

impl FilterRepo {
    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.prefix_args);
        command
    }

    fn display(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.prefix_args.iter().map(String::as_str))
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fails with [`GuardError::ExternalToolUnavailable`] unless `--version` succeeds.
    pub fn check_available(&self) -> Result<()> {
        let unavailable = || GuardError::ExternalToolUnavailable {
            tool: self.display(&[]),
            hint: "install it with `pip install git-filter-repo`".to_string(),
        };
        match self.command().arg("--version").output() {
            Ok(output) if output.status.success() => Ok(()),
            _ => Err(unavailable()),
        }
    }

    fn run(&self, workdir: &Path, args: &[String], backup: Option<&Path>) -> Result<()> {
        debug!(command = %self.display(args), "Running history filter");
        let output = self.command().args(args).current_dir(workdir).output()?;
        if output.status.success() {
            return Ok(());
        }
        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if let Some(backup) = backup {
            stderr.push_str(&format!("\nrestore from the backup at {}", backup.display()));
        }
        Err(GuardError::VcsCommandFailed {
            command: self.display(args),
            status: output.status.code(),
            stderr,
        })
    }
}

/// Selects historical paths by cleaner path.
///
/// [`PathSelector::matches`] is the broad scan used by analysis: globs test the
/// whole path and the file name, anything else matches as a prefix or at any
/// `/` boundary. [`PathSelector::removes`] mirrors what `git filter-repo`
/// drops for the same `--path` and `--path-glob` arguments.
struct PathSelector {
    plain: Vec<String>,
    globs: Vec<GlobMatcher>,
}

impl PathSelector {
    fn new(patterns: &[String]) -> Result<Self> {
        let mut plain = Vec::new();
        let mut globs = Vec::new();
        for pattern in patterns {
            if is_glob(pattern) {
                let glob = Glob::new(pattern).map_err(|e| {
                    GuardError::config("cleaner.private_paths", format!("bad glob `{pattern}`: {e}"))
                })?;
                globs.push(glob.compile_matcher());
            } else {
                plain.push(pattern.clone());
            }
        }
        Ok(Self { plain, globs })
    }

    fn matches(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.plain
            .iter()
            .any(|p| path.starts_with(p.as_str()) || path.contains(&format!("/{p}")))
            || self
                .globs
                .iter()
                .any(|g| g.is_match(path) || g.is_match(name))
    }

    fn removes(&self, path: &str) -> bool {
        self.plain.iter().any(|p| {
            path.strip_prefix(p.as_str())
                .is_some_and(|rest| p.ends_with('/') || rest.is_empty() || rest.starts_with('/'))
        }) || self.globs.iter().any(|g| g.is_match(path))
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Whether Windows reserves the base name of `path`.
pub fn is_windows_reserved(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path).to_uppercase();
    let base = name.split('.').next().unwrap_or(&name);
    WINDOWS_RESERVED.contains(&base)
}

/// Plans and runs history rewrites.
pub struct HistoryCleaner<'a, V: Vcs> {
    vcs: &'a V,
    private_paths: &'a [String],
    filter: FilterRepo,
}

impl<'a, V: Vcs> HistoryCleaner<'a, V> {
    /// Creates a cleaner using `git filter-repo`.
    pub fn new(vcs: &'a V, policy: &'a Policy) -> Self {
        Self {
            vcs,
            private_paths: &policy.cleaner_paths,
            filter: FilterRepo::default(),
        }
    }

    /// Uses a different filter program.
    pub fn with_filter(mut self, filter: FilterRepo) -> Self {
        self.filter = filter;
        self
    }

    /// Scans every path in history for private and Windows-incompatible names.
    pub fn analyze_repository(&self) -> Result<RepositoryAnalysis> {
        let selector = PathSelector::new(self.private_paths)?;
        let paths = self.vcs.history_paths()?;
        let analysis = RepositoryAnalysis {
            commit_count: self.vcs.commit_count()?,
            branches: self.vcs.list_branches()?,
            sensitive_paths: paths.iter().filter(|p| selector.matches(p)).cloned().collect(),
            incompatible_paths: paths
                .iter()
                .filter(|p| is_windows_reserved(p))
                .cloned()
                .collect(),
        };
        info!(
            commits = analysis.commit_count,
            sensitive = analysis.sensitive_paths.len(),
            incompatible = analysis.incompatible_paths.len(),
            "Analysed repository history"
        );
        Ok(analysis)
    }

    fn paths_for(&self, config: &CleaningConfig, analysis: &RepositoryAnalysis) -> Result<Vec<String>> {
        match config.recipe {
            CleaningRecipe::PreOpenSource if config.paths_to_remove.is_empty() => {
                Ok(self.private_paths.to_vec())
            }
            CleaningRecipe::PreOpenSource => Ok(config.paths_to_remove.clone()),
            CleaningRecipe::WindowsSafe => Ok(analysis.incompatible_paths.clone()),
            CleaningRecipe::Custom if config.paths_to_remove.is_empty() => Err(GuardError::config(
                "paths",
                "the custom recipe needs at least one path",
            )),
            CleaningRecipe::Custom => Ok(config.paths_to_remove.clone()),
            recipe @ (CleaningRecipe::RemoveSecrets | CleaningRecipe::CutoffDate) => Err(
                GuardError::NotImplemented(format!("the `{recipe}` cleaning recipe")),
            ),
        }
    }

    /// Reports what `config` would remove, without running anything.
    pub fn preview_cleaning(&self, config: &CleaningConfig) -> Result<CleaningPreview> {
        let analysis = self.analyze_repository()?;
        let paths_to_remove = self.paths_for(config, &analysis)?;
        let selector = PathSelector::new(&paths_to_remove)?;
        let files_to_remove = self
            .vcs
            .history_paths()?
            .iter()
            .filter(|p| selector.removes(p))
            .collect::<BTreeSet<_>>()
            .len();

        let mut warnings = Vec::new();
        if config.recipe == CleaningRecipe::PreOpenSource {
            let kept: Vec<&str> = analysis
                .sensitive_paths
                .iter()
                .filter(|p| !selector.removes(p))
                .map(String::as_str)
                .collect();
            if !kept.is_empty() {
                warnings.push(format!(
                    "{} sensitive path(s) are not removed by this recipe: {}; add them with --path",
                    kept.len(),
                    kept.join(", ")
                ));
            }
        }
        if !analysis.incompatible_paths.is_empty() && config.recipe != CleaningRecipe::WindowsSafe {
            warnings.push(format!(
                "Found {} Windows reserved name(s); consider --recipe windows-safe",
                analysis.incompatible_paths.len()
            ));
        }
        if analysis.branches.len() > MANY_BRANCHES {
            warnings.push(format!(
                "Repository has {} branches; cleaning affects all branches",
                analysis.branches.len()
            ));
        }

        Ok(CleaningPreview {
            recipe: config.recipe,
            paths_to_remove,
            files_to_remove,
            warnings,
        })
    }

    /// Rewrites history to drop the recipe's paths.
    ///
    /// Requires `git filter-repo`, a clean working tree (unless forced or
    /// dry-run), confirmation (unless dry-run or `assume_yes`), and a backup
    /// (unless dry-run or explicitly skipped).
    pub fn clean_history(
        &self,
        config: &CleaningConfig,
        prompter: &mut dyn Prompter,
    ) -> Result<CleaningReport> {
        let analysis = self.analyze_repository()?;
        let paths = self.paths_for(config, &analysis)?;
        self.filter.check_available()?;

        if !config.force && !config.dry_run {
            let changes = self.vcs.working_tree_changes(true)?;
            if !changes.is_empty() {
                return Err(GuardError::UnsafeOperationAborted(format!(
                    "{} uncommitted change(s) detected; commit or stash them first",
                    changes.len()
                )));
            }
        }

        let mut report = CleaningReport {
            recipe: config.recipe,
            paths_removed: paths.clone(),
            backup: None,
            dry_run: config.dry_run,
            executed: false,
        };
        if paths.is_empty() {
            info!(recipe = %config.recipe, "Nothing to clean");
            return Ok(report);
        }

        if !config.dry_run && !config.assume_yes {
            let question = format!(
                "This rewrites the history of every branch, cannot be undone except from a backup, and requires force-pushing. Remove {} path(s)?",
                paths.len()
            );
            if !confirm(prompter, &question, false)? {
                return Err(GuardError::UnsafeOperationAborted(
                    "history cleaning declined".to_string(),
                ));
            }
        }

        if !config.dry_run {
            report.backup = self.backup(&config.backup)?;
        }

        let mut args = vec!["--force".to_string()];
        if config.dry_run {
            args.push("--dry-run".to_string());
        }
        for path in &paths {
            let flag = if is_glob(path) { "--path-glob" } else { "--path" };
            args.push(flag.to_string());
            args.push(path.clone());
        }
        args.push("--invert-paths".to_string());

        info!(recipe = %config.recipe, paths = paths.len(), dry_run = config.dry_run, "Rewriting history");
        self.filter
            .run(self.vcs.workdir(), &args, report.backup.as_deref())?;
        report.executed = true;
        Ok(report)
    }

    fn backup(&self, location: &BackupLocation) -> Result<Option<PathBuf>> {
        let dest = match location {
            BackupLocation::Skip => {
                warn!("Skipping backup before rewriting history");
                return Ok(None);
            }
            BackupLocation::Path(path) => path.clone(),
            BackupLocation::Default => default_backup_path(self.vcs.workdir()),
        };
        info!(path = %dest.display(), "Creating mirror backup");
        self.vcs.mirror_clone(&dest)?;
        Ok(Some(dest))
    }
}

fn default_backup_path(workdir: &Path) -> PathBuf {
    let name = workdir
        .file_name()
        .map_or_else(|| "repository".to_string(), |n| n.to_string_lossy().into_owned());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    workdir.with_file_name(format!("{name}_backup_{stamp}"))
}
