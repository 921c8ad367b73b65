//! Configuration loading and the compiled policy injected into every component.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::branch::BranchClassifier;
use crate::error::{GuardError, Result};
use crate::history::{BranchRule, HistoryProtectionPlanner, MergeAction};
use crate::rules::{ContentSensitivityMatcher, Rule, RuleEntry, RuleSet};

pub mod discovery;

pub use discovery::{resolve_config_dir, resolve_config_file, ConfigSource};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn entries(items: &[&str]) -> Vec<RuleEntry> {
    items.iter().map(|s| RuleEntry::from(*s)).collect()
}

/// repoguard configuration as written in `config.yaml`.
///
/// Every field falls back to its default when absent, so a file only needs
/// the settings it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Branch holding the canonical copy of private files.
    pub private_branch: String,
    /// Branch names that accept private content.
    pub private_branches: Vec<String>,
    /// Branch names that must stay clean.
    pub public_branches: Vec<String>,
    /// Prefixes marking a branch as private.
    pub private_branch_prefixes: Vec<String>,
    /// Paths that are always private.
    pub private_patterns: Vec<RuleEntry>,
    /// Paths that exist on private branches but never on public ones.
    pub exclude_from_public: Vec<RuleEntry>,
    /// Incidental artifacts swept from public branches.
    pub artifact_patterns: Vec<RuleEntry>,
    /// Private-only paths restored into public checkouts.
    pub restore_on_public: Vec<String>,
    /// Local exclude entries written while a private branch is checked out.
    pub private_branch_excludes: Vec<String>,
    /// Merge policy for development branches.
    pub history: HistoryConfig,
    /// History rewriting defaults.
    pub cleaner: CleanerConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        let mut private_patterns = entries(&[
            "CLAUDE.md",
            "private/",
            "convos/",
            "logs/",
            "credentials/",
            "secrets/",
            ".env.local",
            ".env.private",
            ".repoguard/local/",
            "**/__private__*",
            "**/private_*",
            "*~",
            "*.*~",
        ]);
        private_patterns.push(RuleEntry::Tagged(Rule::Substring("__private__".into())));

        Self {
            private_branch: "private".to_string(),
            private_branches: strings(&["private", "local"]),
            public_branches: strings(&[
                "main",
                "master",
                "dev",
                "test",
                "staging",
                "live",
                "prod",
                "production",
            ]),
            private_branch_prefixes: strings(&["private/", "local/", "feature/", "feat/"]),
            private_patterns,
            exclude_from_public: entries(&[
                "CLAUDE.md",
                "private/claude/",
                "private/docs/",
                "private/notes/",
                "private/temp/",
                "revisions/",
                "test-runs/",
                "test_runs/",
            ]),
            artifact_patterns: entries(&[
                "Clipboard Text*",
                "nul",
                "*.tmp",
                "*.log",
                ".env*",
                "*.backup",
                "*.bak",
                "*~",
                "logs/**",
                "revisions/**",
            ]),
            restore_on_public: strings(&["CLAUDE.md", "private/claude/", "private/docs/"]),
            private_branch_excludes: strings(&["test-runs/", "test_runs/"]),
            history: HistoryConfig::default(),
            cleaner: CleanerConfig::default(),
        }
    }
}

/// Development-branch merge policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Ordered branch rules; the first matching pattern wins.
    pub branch_rules: Vec<BranchRule>,
    /// Case-insensitive regexes redacted from synthesized commit messages.
    pub sensitive_message_patterns: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let rule = |pattern: &str, action, auto| BranchRule {
            pattern: pattern.to_string(),
            action,
            auto,
            preserve_last: 0,
            message_template: None,
        };
        Self {
            branch_rules: vec![
                rule("prototype/*", MergeAction::Squash, true),
                rule("experiment/*", MergeAction::Squash, true),
                rule("spike/*", MergeAction::Squash, true),
                rule("feature/*", MergeAction::Interactive, false),
                rule("bugfix/*", MergeAction::Preserve, true),
                rule("hotfix/*", MergeAction::Preserve, true),
            ],
            sensitive_message_patterns: strings(&[
                r"private/",
                r"secret",
                r"password",
                r"token",
                r"TODO:\s*hack",
                r"FIXME:\s*security",
                r"XXX:",
                r"HACK:",
                r"TEMP:",
                r"DO NOT COMMIT",
                r"@nocommit",
            ]),
        }
    }
}

/// History cleaner defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Paths removed by the `pre-open-source` recipe.
    pub private_paths: Vec<String>,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            private_paths: strings(&[
                "private/",
                "revisions/",
                "convos/",
                "logs/",
                "credentials/",
                "secrets/",
                ".env",
                "CLAUDE.md",
                ".claude",
                "__private__",
                "*~",
            ]),
        }
    }
}

impl GuardConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| GuardError::config("config.yaml", e.to_string()))
    }

    /// Reads a configuration file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GuardError::config(path.display().to_string(), format!("cannot read file: {e}"))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| GuardError::config(path.display().to_string(), e.to_string()))
    }

    /// Loads configuration for the repository rooted at `repo_root`.
    ///
    /// An explicit path must exist. Otherwise the discovery chain is walked
    /// and built-in defaults apply when nothing is found.
    pub fn load(repo_root: &Path, explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let source = match explicit {
            Some(path) => ConfigSource::Explicit(path.to_path_buf()),
            None => resolve_config_file(&resolve_config_dir(repo_root), discovery::CONFIG_FILE),
        };
        debug!(source = %source, "Resolved configuration");
        let config = match source.path() {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        Ok((config, source))
    }
}

/// Compiled, immutable configuration shared by every component.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Branch holding the canonical private files.
    pub private_branch: String,
    /// Branch classifier.
    pub classifier: BranchClassifier,
    /// Always-private paths.
    pub private_patterns: RuleSet,
    /// Paths excluded when content crosses to a public branch.
    pub exclude_from_public: RuleSet,
    /// Incidental artifact sweep.
    pub artifacts: RuleSet,
    /// Paths restored into public checkouts.
    pub restore_on_public: Vec<String>,
    /// Local exclude entries for private checkouts.
    pub private_branch_excludes: Vec<String>,
    /// Development-branch merge planner.
    pub history: HistoryProtectionPlanner,
    /// Paths for the `pre-open-source` cleaning recipe.
    pub cleaner_paths: Vec<String>,
}

impl Policy {
    /// Compiles `config`, failing on the first malformed entry.
    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        if config.private_branch.trim().is_empty() {
            return Err(GuardError::config("private_branch", "must not be empty"));
        }
        if let Some(bad) = config
            .restore_on_public
            .iter()
            .find(|p| p.trim().trim_end_matches('/').is_empty())
        {
            return Err(GuardError::config(
                "restore_on_public",
                format!("invalid path `{bad}`"),
            ));
        }

        Ok(Self {
            private_branch: config.private_branch.trim().to_string(),
            classifier: BranchClassifier::new(
                &config.private_branches,
                &config.public_branches,
                &config.private_branch_prefixes,
            ),
            private_patterns: RuleSet::from_entries("private_patterns", &config.private_patterns)?,
            exclude_from_public: RuleSet::from_entries(
                "exclude_from_public",
                &config.exclude_from_public,
            )?,
            artifacts: RuleSet::from_entries("artifact_patterns", &config.artifact_patterns)?,
            restore_on_public: config.restore_on_public.clone(),
            private_branch_excludes: config.private_branch_excludes.clone(),
            history: HistoryProtectionPlanner::new(
                config.history.branch_rules.clone(),
                &config.history.sensitive_message_patterns,
            )?,
            cleaner_paths: config.cleaner.private_paths.clone(),
        })
    }

    /// Compiles the built-in defaults.
    pub fn defaults() -> Result<Self> {
        Self::from_config(&GuardConfig::default())
    }

    /// Matcher used by the commit guard and verification of staged content.
    pub fn guard_matcher(&self) -> ContentSensitivityMatcher<'_> {
        ContentSensitivityMatcher::new([&self.private_patterns, &self.exclude_from_public])
    }

    /// Matcher for everything a public branch must not track, artifacts included.
    pub fn public_matcher(&self) -> ContentSensitivityMatcher<'_> {
        ContentSensitivityMatcher::new([
            &self.private_patterns,
            &self.exclude_from_public,
            &self.artifacts,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_compile() {
        let policy = Policy::defaults().unwrap();
        assert_eq!(policy.private_branch, "private");
        assert!(policy.guard_matcher().is_sensitive("CLAUDE.md").is_some());
        assert!(policy.guard_matcher().is_sensitive("src/main.rs").is_none());
        assert!(policy.public_matcher().is_sensitive("build.log").is_some());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = GuardConfig::from_yaml_str("private_branch: vault\npublic_branches: [trunk]\n")
            .unwrap();
        assert_eq!(config.private_branch, "vault");
        assert_eq!(config.public_branches, vec!["trunk".to_string()]);
        assert_eq!(config.private_branches, GuardConfig::default().private_branches);
        assert_eq!(config.history, HistoryConfig::default());
    }

    #[test]
    fn history_rules_parse() {
        let yaml = "history:\n  branch_rules:\n    - pattern: 'wip/*'\n      action: squash\n      auto: true\n";
        let config = GuardConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.history.branch_rules.len(), 1);
        assert_eq!(config.history.branch_rules[0].action, MergeAction::Squash);
        assert!(!config.history.sensitive_message_patterns.is_empty());
    }

    #[test]
    fn malformed_glob_fails_fast() {
        let config = GuardConfig::from_yaml_str("exclude_from_public: ['[oops']\n").unwrap();
        let err = Policy::from_config(&config).unwrap_err();
        assert!(
            matches!(err, GuardError::Configuration { ref field, .. } if field == "exclude_from_public"),
            "{err}"
        );
    }

    #[test]
    fn malformed_regex_fails_fast() {
        let config =
            GuardConfig::from_yaml_str("history:\n  sensitive_message_patterns: ['(unclosed']\n")
                .unwrap();
        assert!(matches!(
            Policy::from_config(&config),
            Err(GuardError::Configuration { .. })
        ));
    }

    #[test]
    fn unknown_yaml_shape_is_configuration_error() {
        assert!(matches!(
            GuardConfig::from_yaml_str("public_branches: 7\n"),
            Err(GuardError::Configuration { .. })
        ));
    }

    #[test]
    fn load_uses_project_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config_dir = dir.path().join(discovery::CONFIG_DIR);
        fs::create_dir_all(&config_dir)?;
        fs::write(config_dir.join(discovery::CONFIG_FILE), "private_branch: vault\n")?;

        let (config, source) = GuardConfig::load(dir.path(), None)?;
        assert_eq!(config.private_branch, "vault");
        assert!(matches!(source, ConfigSource::Project(_)));
        Ok(())
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let err = GuardConfig::load(Path::new("."), Some(Path::new("/nonexistent/rg.yaml")));
        assert!(matches!(err, Err(GuardError::Configuration { .. })));
    }
}
