//! Private-file synchronisation on branch switches.

use std::collections::BTreeSet;
use std::fs;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::branch::Classification;
use crate::config::Policy;
use crate::error::Result;
use crate::git::Vcs;
use crate::ignore;
use crate::rules::Rule;

/// A restore-list entry that could not be restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRestore {
    /// Path from the restore list, or a file beneath it.
    pub path: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of synchronising a checkout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Destination branch.
    pub branch: String,
    /// How the destination branch classifies.
    pub classification: Option<Classification>,
    /// Files written into the working tree.
    pub restored: Vec<String>,
    /// Files that were not restored.
    pub skipped: Vec<SkippedRestore>,
    /// Whether the local exclude file was rewritten.
    pub exclude_updated: bool,
}

/// Restores private-only files into public checkouts and keeps the local
/// exclude block in step with the checked-out branch.
pub struct CheckoutSynchronizer<'a, V: Vcs> {
    vcs: &'a V,
    policy: &'a Policy,
}

impl<'a, V: Vcs> CheckoutSynchronizer<'a, V> {
    /// Creates a synchronizer.
    pub fn new(vcs: &'a V, policy: &'a Policy) -> Self {
        Self { vcs, policy }
    }

    /// Handles a switch to `branch`.
    ///
    /// Public branches get the restore list written into the working tree and
    /// hidden through `info/exclude`. Private branches get the exclude block
    /// reset so those paths are visible again.
    pub fn on_checkout(&self, branch: &str) -> Result<SyncReport> {
        let classification = self.policy.classifier.classify(branch);
        info!(branch, %classification, "Synchronising checkout");

        let mut report = SyncReport {
            branch: branch.to_string(),
            classification: Some(classification),
            ..SyncReport::default()
        };
        if classification.is_public() && branch != self.policy.private_branch {
            let (restored, skipped) = self.restore_private_files()?;
            report.restored = restored;
            report.skipped = skipped;
        }
        report.exclude_updated = self.update_local_excludes(classification)?;
        Ok(report)
    }

    /// Copies restore-list paths from the private branch into the working tree.
    ///
    /// Only the working tree is written; the index is never touched. A path
    /// tracked on the current branch is left alone. Individual failures are
    /// logged and reported as skipped.
    pub fn restore_private_files(&self) -> Result<(Vec<String>, Vec<SkippedRestore>)> {
        let source = self.policy.private_branch.as_str();
        let mut restored = Vec::new();
        let mut skipped = Vec::new();

        if self.vcs.resolve_ref(source)?.is_none() {
            warn!(branch = source, "Private branch not found; nothing to restore");
            skipped.extend(self.policy.restore_on_public.iter().map(|path| SkippedRestore {
                path: path.clone(),
                reason: format!("branch `{source}` does not exist"),
            }));
            return Ok((restored, skipped));
        }

        let tracked_here: BTreeSet<String> =
            self.vcs.list_tracked_files(None)?.into_iter().collect();
        let source_files = self.vcs.list_tracked_files(Some(source))?;

        for entry in &self.policy.restore_on_public {
            let candidates: Vec<String> = match Rule::parse(entry) {
                Rule::DirectoryPrefix(dir) => {
                    let prefix = format!("{}/", dir.trim_end_matches('/'));
                    source_files
                        .iter()
                        .filter(|path| path.starts_with(&prefix))
                        .cloned()
                        .collect()
                }
                rule => vec![rule.value().to_string()],
            };
            if candidates.is_empty() {
                debug!(entry, "Nothing under restore entry on private branch");
                skipped.push(SkippedRestore {
                    path: entry.clone(),
                    reason: format!("not present on `{source}`"),
                });
                continue;
            }

            for path in candidates {
                if tracked_here.contains(&path) {
                    skipped.push(SkippedRestore {
                        path,
                        reason: "tracked on this branch".to_string(),
                    });
                    continue;
                }
                match self.restore_one(source, &path) {
                    Ok(true) => restored.push(path),
                    Ok(false) => skipped.push(SkippedRestore {
                        path,
                        reason: format!("not present on `{source}`"),
                    }),
                    Err(e) => {
                        warn!(path = %path, error = %e, "Failed to restore private file");
                        skipped.push(SkippedRestore {
                            path,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            restored = restored.len(),
            skipped = skipped.len(),
            "Private file restoration finished"
        );
        Ok((restored, skipped))
    }

    fn restore_one(&self, source: &str, path: &str) -> Result<bool> {
        let Some(content) = self.vcs.read_blob(source, path)? else {
            return Ok(false);
        };
        let target = self.vcs.workdir().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
        debug!(path, "Restored private file");
        Ok(true)
    }

    /// Rewrites the managed block in `info/exclude` for a checkout of the
    /// given classification. Returns whether the file changed.
    pub fn update_local_excludes(&self, classification: Classification) -> Result<bool> {
        let path = self.vcs.git_path("info/exclude")?;
        let entries = exclude_entries(self.policy, classification);
        if entries.is_empty() {
            return ignore::remove_block(&path);
        }
        ignore::write_block(&path, &entries)
    }
}

/// Local exclude entries for a checkout of the given classification.
pub fn exclude_entries(policy: &Policy, classification: Classification) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let entries: Vec<String> = if classification.is_public() {
        policy
            .restore_on_public
            .iter()
            .map(|entry| Rule::parse(entry).ignore_pattern())
            .chain(policy.exclude_from_public.rules().map(Rule::ignore_pattern))
            .collect()
    } else {
        policy.private_branch_excludes.clone()
    };
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}
