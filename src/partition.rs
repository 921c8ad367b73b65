//! Public branch derivation and verification.
//!
//! [`BranchPartitioner`] derives a public branch from a private one by
//! resetting the target to the source commit, untracking every sensitive path
//! found in the index, and committing the result. The index is the only
//! authority on what a branch contains; the working tree is touched solely to
//! delete the bytes of removed files.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Policy;
use crate::error::{GuardError, Result};
use crate::git::{Vcs, SHORT_HASH_LEN};
use crate::ignore;
use crate::rules::{ContentSensitivityMatcher, Rule, SensitivityVerdict};
use crate::utils::preflight;

/// Number of removed paths listed in the partition commit message.
const MESSAGE_SAMPLE: usize = 10;

/// Result of verifying a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Verified branch.
    pub branch: String,
    /// Number of tracked paths inspected.
    pub tracked_files: usize,
    /// Tracked paths that must not be on a public branch.
    pub violations: Vec<SensitivityVerdict>,
}

impl VerifyReport {
    /// Whether the branch tracks no sensitive paths.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Converts a failed verification into [`GuardError::VerificationFailed`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(GuardError::VerificationFailed {
                branch: self.branch,
                violations: self.violations,
            })
        }
    }
}

/// Result of deriving a public branch.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
    /// Private branch the target was derived from.
    pub source: String,
    /// Public branch that was (re)created.
    pub target: String,
    /// Commit of `source` the target was derived from.
    pub source_commit: String,
    /// Paths untracked on the target.
    pub removed: Vec<SensitivityVerdict>,
    /// Entries written to the target's `.gitignore` block.
    pub ignore_entries: Vec<String>,
    /// New partition commit, if one was needed.
    pub commit: Option<String>,
    /// Whether an identical earlier partition commit was reused.
    pub reused_previous: bool,
    /// Post-partition verification.
    pub verification: VerifyReport,
}

/// Derives clean public branches from private ones.
pub struct BranchPartitioner<'a, V: Vcs> {
    vcs: &'a V,
    policy: &'a Policy,
}

struct Derived {
    removed: Vec<SensitivityVerdict>,
    ignore_entries: Vec<String>,
    commit: Option<String>,
    reused_previous: bool,
}

impl<'a, V: Vcs> BranchPartitioner<'a, V> {
    /// Creates a partitioner.
    pub fn new(vcs: &'a V, policy: &'a Policy) -> Self {
        Self { vcs, policy }
    }

    /// Points `target` at `source` with every private path removed, then verifies it.
    ///
    /// Re-running on an unchanged source is a no-op that produces no new
    /// commit. The originally checked-out branch is restored afterwards. If
    /// any step fails, verification included, `target` is put back where it
    /// was (or deleted when it did not exist) on a best-effort basis.
    pub fn create_clean_public_branch(&self, target: &str, source: &str) -> Result<PartitionReport> {
        let original = preflight::check_on_branch(self.vcs)?;
        if target == source {
            return Err(GuardError::UnsafeOperationAborted(format!(
                "source and target are both `{target}`"
            )));
        }
        let source_commit = preflight::check_branch_exists(self.vcs, source)?;
        if !self.policy.classifier.is_public(target) {
            warn!(target, "Target branch is classified as private; deriving it anyway");
        }
        preflight::check_not_checked_out_elsewhere(self.vcs, target)?;
        preflight::check_working_directory_clean(self.vcs)?;

        info!(source, target, commit = %short(&source_commit), "Deriving public branch");
        let previous_tip = self.vcs.resolve_ref(target)?;
        let derived = match self.derive(target, source, &source_commit, previous_tip.as_deref()) {
            Ok(derived) => derived,
            Err(e) => {
                self.recover(target, &original, previous_tip.as_deref());
                return Err(e);
            }
        };

        let verification = self
            .return_to(&original)
            .and_then(|()| self.verify(target))
            .and_then(VerifyReport::into_result);
        let verification = match verification {
            Ok(verification) => verification,
            Err(e) => {
                warn!(target, error = %e, "Partition not verified; rolling back");
                self.recover(target, &original, previous_tip.as_deref());
                return Err(e);
            }
        };
        info!(
            target,
            removed = derived.removed.len(),
            committed = derived.commit.is_some(),
            "Public branch verified"
        );

        Ok(PartitionReport {
            source: source.to_string(),
            target: target.to_string(),
            source_commit,
            removed: derived.removed,
            ignore_entries: derived.ignore_entries,
            commit: derived.commit,
            reused_previous: derived.reused_previous,
            verification,
        })
    }

    fn derive(
        &self,
        target: &str,
        source: &str,
        source_commit: &str,
        previous_tip: Option<&str>,
    ) -> Result<Derived> {
        match previous_tip {
            Some(_) => {
                self.vcs.checkout(target)?;
                self.vcs.hard_reset(source_commit)?;
            }
            None => {
                self.vcs.create_branch(target, source_commit)?;
                self.vcs.checkout(target)?;
            }
        }

        let tracked = self.vcs.list_tracked_files(None)?;
        let (removed, rules) = self.classify(&tracked);
        if removed.is_empty() {
            debug!(target, "Source tracks no private paths");
            return Ok(Derived {
                removed,
                ignore_entries: Vec::new(),
                commit: None,
                reused_previous: false,
            });
        }

        for path in removal_targets(&removed, &rules) {
            self.vcs.stage_remove(&path, false)?;
        }

        let ignore_entries: Vec<String> = rules
            .iter()
            .map(Rule::ignore_pattern)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let gitignore = self.vcs.workdir().join(".gitignore");
        if ignore::write_block(&gitignore, &ignore_entries)? {
            self.vcs.stage_add(".gitignore")?;
        }

        let tree = self.vcs.write_tree()?;
        if let Some(previous) = previous_tip {
            if self.is_equivalent(previous, source_commit, &tree)? {
                debug!(target, commit = %short(previous), "Reusing identical partition commit");
                self.vcs.hard_reset(previous)?;
                return Ok(Derived {
                    removed,
                    ignore_entries,
                    commit: None,
                    reused_previous: true,
                });
            }
        }

        let commit = self
            .vcs
            .commit(&partition_message(source, source_commit, &removed))?;
        Ok(Derived {
            removed,
            ignore_entries,
            commit: Some(commit),
            reused_previous: false,
        })
    }

    /// Splits tracked paths into verdicts, with the rules that matched them.
    fn classify(&self, tracked: &[String]) -> (Vec<SensitivityVerdict>, Vec<Rule>) {
        let primary = self.policy.guard_matcher();
        let sweep = ContentSensitivityMatcher::new([&self.policy.artifacts]);
        let mut removed = Vec::new();
        let mut rules = BTreeSet::new();
        for path in tracked {
            let Some(rule) = primary
                .matching_rule(path)
                .or_else(|| sweep.matching_rule(path))
            else {
                continue;
            };
            removed.push(SensitivityVerdict::new(path.as_str(), rule.describe()));
            rules.insert(rule.clone());
        }
        removed.sort();
        (removed, rules.into_iter().collect())
    }

    fn is_equivalent(&self, previous: &str, source_commit: &str, tree: &str) -> Result<bool> {
        let parent = self.vcs.resolve_ref(&format!("{previous}^"))?;
        let previous_tree = self.vcs.resolve_ref(&format!("{previous}^{{tree}}"))?;
        Ok(parent.as_deref() == Some(source_commit) && previous_tree.as_deref() == Some(tree))
    }

    fn return_to(&self, original: &str) -> Result<()> {
        if self.vcs.current_branch()?.as_deref() != Some(original) {
            self.vcs.checkout(original)?;
        }
        Ok(())
    }

    /// Best-effort undo: back on `original`, with `target` where it was before.
    fn recover(&self, target: &str, original: &str, previous_tip: Option<&str>) {
        if matches!(self.vcs.current_branch(), Ok(Some(ref current)) if current == target) {
            if let Err(e) = self.vcs.hard_reset(previous_tip.unwrap_or("HEAD")) {
                warn!(error = %e, "Failed to discard partial partition state");
            }
        }
        if let Err(e) = self.return_to(original) {
            warn!(branch = original, error = %e, "Failed to return to original branch");
            return;
        }
        if original == target {
            return;
        }

        let restored = match previous_tip {
            Some(tip) => self.vcs.update_branch(target, tip),
            None if self.vcs.branch_exists(target).unwrap_or(false) => {
                self.vcs.delete_branch(target)
            }
            None => Ok(()),
        };
        if let Err(e) = restored {
            warn!(target, error = %e, "Failed to restore target branch");
        }
    }

    /// Re-reads the tracked paths of `branch` and reports any that are private.
    pub fn verify(&self, branch: &str) -> Result<VerifyReport> {
        let tracked = self.vcs.list_tracked_files(Some(branch))?;
        let violations = self.policy.public_matcher().scan(&tracked);
        debug!(branch, tracked = tracked.len(), violations = violations.len(), "Verified branch");
        Ok(VerifyReport {
            branch: branch.to_string(),
            tracked_files: tracked.len(),
            violations,
        })
    }
}

/// Paths to pass to `git rm`: whole directories for directory rules, single
/// files otherwise.
fn removal_targets(removed: &[SensitivityVerdict], rules: &[Rule]) -> Vec<String> {
    let dirs: Vec<&str> = rules
        .iter()
        .filter_map(|rule| match rule {
            Rule::DirectoryPrefix(dir) => Some(dir.trim_end_matches('/')),
            _ => None,
        })
        .collect();
    let mut targets = BTreeSet::new();
    for verdict in removed {
        let path = verdict.path.as_str();
        let dir = dirs.iter().find(|dir| {
            path.strip_prefix(**dir)
                .is_some_and(|rest| rest.starts_with('/'))
        });
        targets.insert(dir.map_or(path, |dir| *dir).to_string());
    }
    targets.into_iter().collect()
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(SHORT_HASH_LEN)]
}

fn partition_message(source: &str, source_commit: &str, removed: &[SensitivityVerdict]) -> String {
    let mut message = format!(
        "Remove {} private file(s) from public branch\n\nDerived from {source} at {}.\n\nRemoved:\n",
        removed.len(),
        short(source_commit)
    );
    for verdict in removed.iter().take(MESSAGE_SAMPLE) {
        message.push_str(&format!("- {verdict}\n"));
    }
    if removed.len() > MESSAGE_SAMPLE {
        message.push_str(&format!("... and {} more\n", removed.len() - MESSAGE_SAMPLE));
    }
    message
}
