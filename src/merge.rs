//! Merges across the private/public boundary.
//!
//! A merge from a private branch into a public one runs without committing,
//! untracks every path in the exclude-from-public rule set, re-runs the
//! commit guard over what is left, and only then records the merge commit.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Policy;
use crate::error::{GuardError, Result};
use crate::git::{MergeFlags, Vcs};
use crate::guard::CommitGuard;
use crate::rules::{ContentSensitivityMatcher, RuleSet, SensitivityVerdict};
use crate::utils::preflight;

/// Decides which paths a merge must strip.
pub struct MergeExclusionPlanner<'a> {
    policy: &'a Policy,
    none: RuleSet,
}

impl<'a> MergeExclusionPlanner<'a> {
    /// Creates a planner over `policy`.
    pub fn new(policy: &'a Policy) -> Self {
        Self {
            policy,
            none: RuleSet::empty("none"),
        }
    }

    /// The rule set to strip when merging `source` into `target`.
    ///
    /// Only a private-to-public merge strips anything.
    pub fn plan_exclusions(&self, source: &str, target: &str) -> &RuleSet {
        let classifier = &self.policy.classifier;
        if !classifier.is_public(source) && classifier.is_public(target) {
            &self.policy.exclude_from_public
        } else {
            &self.none
        }
    }
}

/// Options for [`safe_merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeMergeOptions {
    /// Report what would happen without changing anything.
    pub preview: bool,
    /// Always create a merge commit.
    pub no_ff: bool,
    /// Leave the merge staged for review.
    pub no_commit: bool,
}

impl Default for SafeMergeOptions {
    fn default() -> Self {
        Self {
            preview: false,
            no_ff: true,
            no_commit: false,
        }
    }
}

/// One incoming commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// Abbreviated hash.
    pub hash: String,
    /// Subject line.
    pub subject: String,
}

/// What a merge would bring in.
#[derive(Debug, Clone, Serialize)]
pub struct MergePreview {
    /// Branch being merged.
    pub source: String,
    /// Branch receiving the merge.
    pub target: String,
    /// Commits on `source` not on `target`, oldest first.
    pub commits: Vec<CommitSummary>,
    /// Rules that will be stripped.
    pub exclusions: Vec<String>,
    /// Paths on `source` those rules match.
    pub excluded_paths: Vec<SensitivityVerdict>,
}

/// What a merge did.
#[derive(Debug, Clone, Serialize)]
pub struct SafeMergeReport {
    /// Branch that was merged.
    pub source: String,
    /// Branch that received the merge.
    pub target: String,
    /// Paths untracked before committing.
    pub excluded: Vec<SensitivityVerdict>,
    /// Whether a merge commit was recorded.
    pub committed: bool,
}

/// Result of [`safe_merge`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum MergeOutcome {
    /// Nothing was changed.
    Preview(MergePreview),
    /// The merge ran.
    Merged(SafeMergeReport),
}

/// Merges `source` into the current branch, stripping private content when
/// crossing from a private branch to a public one.
pub fn safe_merge<V: Vcs>(
    vcs: &V,
    policy: &Policy,
    source: &str,
    options: SafeMergeOptions,
) -> Result<MergeOutcome> {
    let target = preflight::check_on_branch(vcs)?;
    preflight::check_branch_exists(vcs, source)?;
    if target == source {
        return Err(GuardError::UnsafeOperationAborted(format!(
            "cannot merge `{source}` into itself"
        )));
    }

    let planner = MergeExclusionPlanner::new(policy);
    let exclusions = planner.plan_exclusions(source, &target);
    let matcher = ContentSensitivityMatcher::new([exclusions]);

    if options.preview {
        let commits = vcs
            .log(&format!("{target}..{source}"))?
            .iter()
            .map(|c| CommitSummary {
                hash: c.short_hash().to_string(),
                subject: c.subject.clone(),
            })
            .collect();
        return Ok(MergeOutcome::Preview(MergePreview {
            source: source.to_string(),
            target,
            commits,
            exclusions: exclusions.rules().map(|r| r.describe()).collect(),
            excluded_paths: matcher.scan(vcs.list_tracked_files(Some(source))?),
        }));
    }

    preflight::check_working_directory_clean(vcs)?;

    if exclusions.is_empty() {
        info!(source, target = %target, "Merging without exclusions");
        vcs.merge(
            source,
            MergeFlags {
                no_ff: options.no_ff,
                no_commit: options.no_commit,
                squash: false,
            },
        )?;
        return Ok(MergeOutcome::Merged(SafeMergeReport {
            source: source.to_string(),
            target,
            excluded: Vec::new(),
            committed: !options.no_commit,
        }));
    }

    info!(source, target = %target, rules = exclusions.len(), "Merging with exclusions");
    // A fast-forward cannot be stopped before committing.
    let flags = MergeFlags {
        no_ff: true,
        no_commit: true,
        squash: false,
    };
    // A conflicted merge leaves excluded paths staged, so it is aborted too.
    let stripped = vcs
        .merge(source, flags)
        .and_then(|()| strip_and_check(vcs, policy, &matcher, &target));

    match stripped {
        Ok(excluded) => {
            if !options.no_commit {
                vcs.commit(&merge_message(source, &target, &excluded))?;
            }
            Ok(MergeOutcome::Merged(SafeMergeReport {
                source: source.to_string(),
                target,
                excluded,
                committed: !options.no_commit,
            }))
        }
        Err(e) => {
            if let Err(abort) = vcs.abort_merge() {
                warn!(error = %abort, "Failed to abort merge; run `git merge --abort` manually");
            }
            Err(e)
        }
    }
}

fn strip_and_check<V: Vcs>(
    vcs: &V,
    policy: &Policy,
    matcher: &ContentSensitivityMatcher<'_>,
    target: &str,
) -> Result<Vec<SensitivityVerdict>> {
    let excluded = matcher.scan(vcs.list_tracked_files(None)?);
    for verdict in &excluded {
        vcs.stage_remove(&verdict.path, true)?;
    }

    let check = CommitGuard::new(policy).validate(target, &vcs.staged_paths()?);
    if !check.is_ok() {
        return Err(GuardError::CommitBlocked {
            branch: target.to_string(),
            violations: check.violations,
        });
    }
    Ok(excluded)
}

fn merge_message(source: &str, target: &str, excluded: &[SensitivityVerdict]) -> String {
    let mut message = format!("Merge branch '{source}' into {target}");
    if !excluded.is_empty() {
        message.push_str("\n\nExcluded from public branch:\n");
        for verdict in excluded {
            message.push_str(&format!("- {verdict}\n"));
        }
    }
    message
}
