//! Preflight validation checks for early failure detection
//!
//! Destructive operations call these before touching any ref, index or
//! working tree so they fail with a clear message instead of halfway through.

use std::fs;
use std::path::Path;

use crate::error::{GuardError, Result};
use crate::git::{GitRepository, Vcs};

/// Validate we're in a valid git repository and open it.
pub fn check_git_repository() -> Result<GitRepository> {
    GitRepository::open()
}

/// Validate tracked files have no uncommitted changes.
///
/// Untracked files are ignored: private files restored into a public
/// checkout are untracked by design.
pub fn check_working_directory_clean<V: Vcs>(vcs: &V) -> Result<()> {
    let changes = vcs.working_tree_changes(false)?;
    if changes.is_empty() {
        return Ok(());
    }

    let mut message = String::from("working directory has uncommitted changes:\n");
    for change in &changes {
        message.push_str(&format!("  {} {}\n", change.status, change.file));
    }
    message.push_str("Please commit or stash your changes before proceeding.");
    Err(GuardError::UnsafeOperationAborted(message))
}

/// Resolve the current branch, refusing to work from a detached HEAD.
pub fn check_on_branch<V: Vcs>(vcs: &V) -> Result<String> {
    vcs.current_branch()?.ok_or_else(|| {
        GuardError::UnsafeOperationAborted(
            "HEAD is detached; check out a branch before running this command".to_string(),
        )
    })
}

/// Validate `branch` exists and return the commit it points at.
pub fn check_branch_exists<V: Vcs>(vcs: &V, branch: &str) -> Result<String> {
    vcs.resolve_ref(branch)?.ok_or_else(|| {
        GuardError::UnsafeOperationAborted(format!("branch `{branch}` does not exist"))
    })
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Validate `branch` is not checked out in another worktree.
pub fn check_not_checked_out_elsewhere<V: Vcs>(vcs: &V, branch: &str) -> Result<()> {
    let here = vcs.workdir();
    let elsewhere = vcs
        .list_worktrees()?
        .into_iter()
        .find(|w| w.branch.as_deref() == Some(branch) && !same_path(&w.path, here));
    match elsewhere {
        Some(worktree) => Err(GuardError::UnsafeOperationAborted(format!(
            "branch `{branch}` is checked out in another worktree at {}",
            worktree.path.display()
        ))),
        None => Ok(()),
    }
}
