//! Version-control access.
//!
//! Every component talks to git through the [`Vcs`] trait. [`GitRepository`]
//! implements it with libgit2 for reads and the `git` command for anything
//! that mutates the index, refs or working tree.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;

pub mod commit;
pub mod repository;
#[cfg(test)]
pub(crate) mod test_utils;

pub use commit::CommitRecord;
pub use repository::GitRepository;

/// Number of hex characters to show in abbreviated commit hashes.
pub const SHORT_HASH_LEN: usize = 8;

/// Environment variable that turns installed hook bodies into no-ops.
pub const SKIP_HOOKS_ENV: &str = "REPOGUARD_SKIP_HOOKS";

/// Flags forwarded to `git merge`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeFlags {
    /// Always create a merge commit.
    pub no_ff: bool,
    /// Stop before committing so the result can be edited.
    pub no_commit: bool,
    /// Stage the combined changes without recording a merge.
    pub squash: bool,
}

/// A checkout registered with the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Worktree {
    /// Root directory of the checkout.
    pub path: PathBuf,
    /// Branch checked out there, if not detached.
    pub branch: Option<String>,
}

/// A working tree entry that differs from the index or HEAD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    /// Two-letter status code in `git status --short` form.
    pub status: String,
    /// Path relative to the repository root.
    pub file: String,
}

/// Operations the engine needs from the version-control system.
///
/// Paths are repository-relative with `/` separators. "Tracked" always means
/// recorded in the index (or in a commit's tree), never "present on disk".
pub trait Vcs {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    /// Resolves a path inside the git directory, such as `hooks` or `info/exclude`.
    fn git_path(&self, name: &str) -> Result<PathBuf>;

    /// Branch HEAD points at; `None` when detached.
    fn current_branch(&self) -> Result<Option<String>>;

    /// Local branch names.
    fn list_branches(&self) -> Result<Vec<String>>;

    /// Whether a local branch exists.
    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.list_branches()?.iter().any(|b| b == name))
    }

    /// Creates `name` at `start` without checking it out.
    fn create_branch(&self, name: &str, start: &str) -> Result<()>;

    /// Points an existing branch that is not checked out at `rev`.
    fn update_branch(&self, name: &str, rev: &str) -> Result<()>;

    /// Deletes a local branch that is not checked out.
    fn delete_branch(&self, name: &str) -> Result<()>;

    /// Checks out an existing branch.
    fn checkout(&self, branch: &str) -> Result<()>;

    /// Moves the current branch, index and working tree to `rev`.
    fn hard_reset(&self, rev: &str) -> Result<()>;

    /// Tracked paths of the index (`rev == None`) or of a commit's tree.
    fn list_tracked_files(&self, rev: Option<&str>) -> Result<Vec<String>>;

    /// Paths staged for addition or modification; staged deletions are excluded.
    fn staged_paths(&self) -> Result<Vec<String>>;

    /// Stages the working tree state of `path`.
    fn stage_add(&self, path: &str) -> Result<()>;

    /// Untracks `path` (recursively). Removing an untracked path succeeds.
    fn stage_remove(&self, path: &str, keep_working_tree: bool) -> Result<()>;

    /// Records the index as a commit on the current branch and returns its id.
    fn commit(&self, message: &str) -> Result<String>;

    /// Writes the index as a tree object and returns its id.
    fn write_tree(&self) -> Result<String>;

    /// Merges `branch` into the current branch.
    fn merge(&self, branch: &str, flags: MergeFlags) -> Result<()>;

    /// Abandons an in-progress merge.
    fn abort_merge(&self) -> Result<()>;

    /// Resolves a revision expression to an object id.
    fn resolve_ref(&self, rev: &str) -> Result<Option<String>>;

    /// Non-merge commits in `range` (`a..b` or a single revision), oldest first.
    fn log(&self, range: &str) -> Result<Vec<CommitRecord>>;

    /// Paths changed by `commit` relative to its first parent.
    fn diff_tree(&self, commit: &str) -> Result<Vec<String>>;

    /// All checkouts sharing this repository.
    fn list_worktrees(&self) -> Result<Vec<Worktree>>;

    /// Blob content of `path` at `rev`, if the path exists there.
    fn read_blob(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>>;

    /// Every path touched by any commit reachable from any ref.
    fn history_paths(&self) -> Result<Vec<String>>;

    /// Number of commits reachable from any ref.
    fn commit_count(&self) -> Result<usize>;

    /// Uncommitted changes, optionally including untracked files.
    fn working_tree_changes(&self, include_untracked: bool) -> Result<Vec<FileStatus>>;

    /// Creates a mirror clone of the repository at `dest`.
    fn mirror_clone(&self, dest: &Path) -> Result<()>;
}
