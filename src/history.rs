//! History protection for development-branch merges.
//!
//! Branch-name rules decide whether a development branch is squashed,
//! merged with its history preserved, or put to the operator. Squash messages
//! are synthesized from the branch's commits with sensitive text redacted.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use globset::{GlobBuilder, GlobMatcher};
use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Policy;
use crate::error::{GuardError, Result};
use crate::git::{CommitRecord, MergeFlags, Vcs};
use crate::merge::CommitSummary;
use crate::utils::preflight;
use crate::utils::prompt::Prompter;

pub mod cleaner;

/// Replacement for redacted message text.
pub const REDACTION: &str = "[REDACTED]";

/// Maximum key-change lines in a synthesized message.
const MAX_KEY_CHANGES: usize = 5;

/// Maximum authors named in a synthesized message.
const MAX_AUTHORS: usize = 3;

/// Commits shown in an interactive preview.
const PREVIEW_COMMITS: usize = 10;

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static TRIVIAL_SUBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(merge|wip|temp|fix typo)\b").unwrap());

/// How a development branch lands on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeAction {
    /// Collapse every commit into one.
    Squash,
    /// Ordinary merge keeping each commit.
    Preserve,
    /// Ask the operator.
    Interactive,
}

impl MergeAction {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Squash => "squash",
            Self::Preserve => "preserve",
            Self::Interactive => "interactive",
        }
    }
}

/// Merge policy for branches whose names match `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRule {
    /// Glob over branch names; `*` also crosses `/`.
    pub pattern: String,
    /// What to do with matching branches.
    pub action: MergeAction,
    /// Whether the action applies without confirmation.
    #[serde(default)]
    pub auto: bool,
    /// Subjects of this many most recent commits are kept verbatim in a squash message.
    #[serde(default)]
    pub preserve_last: usize,
    /// Title line for squash messages; `{name}` and `{branch}` are substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
}

impl BranchRule {
    fn fallback() -> Self {
        Self {
            pattern: "*".to_string(),
            action: MergeAction::Interactive,
            auto: false,
            preserve_last: 0,
            message_template: None,
        }
    }
}

/// Compiled branch rules and message redaction patterns.
#[derive(Debug, Clone)]
pub struct HistoryProtectionPlanner {
    rules: Vec<(BranchRule, GlobMatcher)>,
    sensitive: Vec<Regex>,
}

impl HistoryProtectionPlanner {
    /// Compiles `rules` and case-insensitive `patterns`.
    pub fn new(rules: Vec<BranchRule>, patterns: &[String]) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let glob = GlobBuilder::new(&rule.pattern)
                    .literal_separator(false)
                    .build()
                    .map_err(|e| {
                        GuardError::config(
                            "history.branch_rules",
                            format!("bad pattern `{}`: {e}", rule.pattern),
                        )
                    })?
                    .compile_matcher();
                Ok((rule, glob))
            })
            .collect::<Result<Vec<_>>>()?;
        let sensitive = patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        GuardError::config(
                            "history.sensitive_message_patterns",
                            format!("bad regex `{pattern}`: {e}"),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, sensitive })
    }

    /// The first rule whose pattern matches `branch`, or interactive/manual.
    pub fn rule_for(&self, branch: &str) -> BranchRule {
        self.rules
            .iter()
            .find(|(_, glob)| glob.is_match(branch))
            .map_or_else(BranchRule::fallback, |(rule, _)| rule.clone())
    }

    /// Replaces every sensitive match in `message` with [`REDACTION`].
    pub fn sanitize(&self, message: &str) -> String {
        self.sensitive
            .iter()
            .fold(message.to_string(), |text, pattern| {
                pattern.replace_all(&text, NoExpand(REDACTION)).into_owned()
            })
    }

    /// Builds a squash commit message for `commits` from `branch`.
    pub fn synthesize(&self, commits: &[CommitRecord], branch: &str) -> String {
        if commits.is_empty() {
            return format!("Merge {branch}");
        }
        let rule = self.rule_for(branch);
        let name = humanize(branch);

        let mut lines = vec![
            rule.message_template.as_deref().map_or_else(
                || format!("feat: {name}"),
                |template| template.replace("{name}", &name).replace("{branch}", branch),
            ),
            String::new(),
        ];

        let mut seen = BTreeSet::new();
        let key_changes: Vec<String> = commits
            .iter()
            .filter(|c| !TRIVIAL_SUBJECT.is_match(&c.subject))
            .map(|c| self.sanitize(c.subject.trim()))
            .filter(|s| !s.is_empty() && s != REDACTION)
            .filter(|s| seen.insert(s.clone()))
            .take(MAX_KEY_CHANGES)
            .collect();
        if !key_changes.is_empty() {
            lines.push("Key changes:".to_string());
            lines.extend(key_changes.iter().map(|s| format!("- {s}")));
            lines.push(String::new());
        }

        if rule.preserve_last > 0 {
            let start = commits.len().saturating_sub(rule.preserve_last);
            lines.push("Recent commits:".to_string());
            lines.extend(
                commits[start..]
                    .iter()
                    .map(|c| format!("- {}", self.sanitize(c.subject.trim()))),
            );
            lines.push(String::new());
        }

        let mut authors: Vec<&str> = Vec::new();
        for commit in commits {
            if !authors.contains(&commit.author.as_str()) {
                authors.push(&commit.author);
            }
        }
        let files: BTreeSet<&str> = commits
            .iter()
            .flat_map(|c| c.changed_paths.iter().map(String::as_str))
            .collect();

        lines.push(format!(
            "Squashed {} commit{} from {branch}",
            commits.len(),
            if commits.len() == 1 { "" } else { "s" }
        ));
        let others = if authors.len() > MAX_AUTHORS { " and others" } else { "" };
        lines.push(format!(
            "Authors: {}{others}",
            authors[..authors.len().min(MAX_AUTHORS)].join(", ")
        ));
        lines.push(format!("Files changed: {}", files.len()));
        lines.join("\n")
    }
}

/// Last path segment of a branch name with `-` and `_` turned into spaces.
fn humanize(branch: &str) -> String {
    branch
        .rsplit('/')
        .next()
        .unwrap_or(branch)
        .replace(['-', '_'], " ")
}

/// Options for [`safe_merge_dev`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeDevOptions {
    /// Branch to merge into; defaults to the current branch.
    pub target: Option<String>,
    /// `Some(true)` forces a squash, `Some(false)` a preserving merge.
    pub squash: Option<bool>,
    /// Squash message to use instead of the synthesized one.
    pub message: Option<String>,
    /// Compute everything without changing the repository.
    pub dry_run: bool,
}

/// Everything [`safe_merge_dev`] decides before touching the repository.
#[derive(Debug, Clone, Serialize)]
pub struct MergeDevPlan {
    /// Development branch.
    pub branch: String,
    /// Branch receiving the merge.
    pub target: String,
    /// Rule that matched `branch`.
    pub rule: BranchRule,
    /// Action after applying any override.
    pub action: MergeAction,
    /// Commits on `branch` not on `target`, oldest first.
    pub commits: Vec<CommitSummary>,
    /// Message a squash would use.
    pub message: String,
}

impl MergeDevPlan {
    /// Operator-facing preview of the merge.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Branch: {}\nCommits: {}\nRule: {} ({})\n\nCommits to be merged:\n",
            self.branch,
            self.commits.len(),
            self.rule.pattern,
            self.action.as_str()
        );
        let start = self.commits.len().saturating_sub(PREVIEW_COMMITS);
        for commit in &self.commits[start..] {
            out.push_str(&format!("  {} {}\n", commit.hash, commit.subject));
        }
        if start > 0 {
            out.push_str(&format!("  ... and {start} more\n"));
        }
        out.push_str("\nSuggested squash message:\n");
        out.push_str(&self.message);
        out
    }
}

/// Result of [`safe_merge_dev`].
#[derive(Debug, Clone, Serialize)]
pub struct MergeDevReport {
    /// What was planned.
    pub plan: MergeDevPlan,
    /// Action actually taken; `None` for dry runs and empty ranges.
    pub performed: Option<MergeAction>,
}

/// Works out how `branch` would be merged, without changing anything.
pub fn plan_merge_dev<V: Vcs>(
    vcs: &V,
    policy: &Policy,
    branch: &str,
    options: &MergeDevOptions,
) -> Result<MergeDevPlan> {
    preflight::check_branch_exists(vcs, branch)?;
    let target = match &options.target {
        Some(target) => {
            preflight::check_branch_exists(vcs, target)?;
            target.clone()
        }
        None => preflight::check_on_branch(vcs)?,
    };

    let records = vcs.log(&format!("{target}..{branch}"))?;
    let rule = policy.history.rule_for(branch);
    let action = match options.squash {
        Some(true) => MergeAction::Squash,
        Some(false) => MergeAction::Preserve,
        None => rule.action,
    };
    let message = options
        .message
        .clone()
        .unwrap_or_else(|| policy.history.synthesize(&records, branch));
    debug!(branch, target = %target, action = action.as_str(), commits = records.len(), "Planned merge");

    Ok(MergeDevPlan {
        branch: branch.to_string(),
        target,
        rule,
        action,
        commits: records
            .iter()
            .map(|c| CommitSummary {
                hash: c.short_hash().to_string(),
                subject: c.subject.clone(),
            })
            .collect(),
        message,
    })
}

/// Merges a development branch according to its history rule.
///
/// Interactive rules ask `prompter`: `y` or an empty answer squashes, `n`
/// preserves, `e` is reported as not implemented. No answer cancels.
pub fn safe_merge_dev<V: Vcs>(
    vcs: &V,
    policy: &Policy,
    branch: &str,
    options: &MergeDevOptions,
    prompter: &mut dyn Prompter,
) -> Result<MergeDevReport> {
    let plan = plan_merge_dev(vcs, policy, branch, options)?;
    if plan.commits.is_empty() {
        info!(branch, target = %plan.target, "Nothing to merge");
        return Ok(MergeDevReport {
            plan,
            performed: None,
        });
    }
    if options.dry_run {
        return Ok(MergeDevReport {
            plan,
            performed: None,
        });
    }

    let action = match plan.action {
        MergeAction::Interactive => choose(prompter, &plan)?,
        action => action,
    };

    preflight::check_working_directory_clean(vcs)?;
    if vcs.current_branch()?.as_deref() != Some(plan.target.as_str()) {
        preflight::check_not_checked_out_elsewhere(vcs, &plan.target)?;
        vcs.checkout(&plan.target)?;
    }

    match action {
        MergeAction::Preserve => {
            info!(branch, commits = plan.commits.len(), "Merging with history preserved");
            vcs.merge(
                branch,
                MergeFlags {
                    no_ff: true,
                    ..MergeFlags::default()
                },
            )?;
        }
        _ => {
            info!(branch, commits = plan.commits.len(), "Squash merging");
            vcs.merge(
                branch,
                MergeFlags {
                    squash: true,
                    ..MergeFlags::default()
                },
            )?;
            vcs.commit(&plan.message)?;
        }
    }

    Ok(MergeDevReport {
        plan,
        performed: Some(action),
    })
}

fn choose(prompter: &mut dyn Prompter, plan: &MergeDevPlan) -> Result<MergeAction> {
    let question = format!("{}\n\nSquash these commits? [Y/n/e(dit)]", plan.render());
    let Some(answer) = prompter.ask(&question)? else {
        return Err(GuardError::UnsafeOperationAborted(
            "no interactive input; pass --squash or --no-squash".to_string(),
        ));
    };
    match answer.to_lowercase().as_str() {
        "" | "y" | "yes" => Ok(MergeAction::Squash),
        "n" | "no" => Ok(MergeAction::Preserve),
        "e" | "edit" => Err(GuardError::NotImplemented(
            "editing the squash message".to_string(),
        )),
        other => Err(GuardError::UnsafeOperationAborted(format!(
            "unrecognised answer `{other}`"
        ))),
    }
}
