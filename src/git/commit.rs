//! Read-only commit projection used for message synthesis.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::{Commit, Repository};
use serde::Serialize;

use crate::error::Result;

/// One commit as seen by history planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    /// Full commit hash.
    pub hash: String,
    /// Author name.
    pub author: String,
    /// Author date with its original offset.
    pub date: DateTime<FixedOffset>,
    /// First line of the message.
    pub subject: String,
    /// Paths changed relative to the first parent.
    pub changed_paths: Vec<String>,
}

impl CommitRecord {
    /// Builds a record from a libgit2 commit.
    pub fn from_git_commit(repo: &Repository, commit: &Commit) -> Result<Self> {
        let signature = commit.author();
        let when = signature.when();
        let utc = DateTime::<Utc>::from_timestamp(when.seconds(), 0).unwrap_or_default();
        let offset = FixedOffset::east_opt(when.offset_minutes() * 60)
            .unwrap_or_else(|| Utc.fix());
        let date = utc.with_timezone(&offset);

        Ok(Self {
            hash: commit.id().to_string(),
            author: signature.name().unwrap_or("Unknown").to_string(),
            date,
            subject: commit.summary().unwrap_or("").to_string(),
            changed_paths: changed_paths(repo, commit)?,
        })
    }

    /// Abbreviated hash.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(super::SHORT_HASH_LEN)]
    }
}

/// Paths touched by `commit` relative to its first parent (or the empty tree).
pub(crate) fn changed_paths(repo: &Repository, commit: &Commit) -> Result<Vec<String>> {
    let commit_tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), None)?;

    let mut paths = Vec::new();
    for delta in diff.deltas() {
        let file = delta.new_file().path().or_else(|| delta.old_file().path());
        if let Some(path) = file.and_then(|p| p.to_str()) {
            paths.push(path.to_string());
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}
