//! In-memory [`Vcs`] used by unit tests.
//!
//! Commits, branches and the index live in memory; the working tree is a real
//! temporary directory so code that writes ignore files or restores private
//! files behaves exactly as it does against git.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset};
use tempfile::TempDir;

use crate::error::{GuardError, Result};
use crate::git::{CommitRecord, FileStatus, MergeFlags, Vcs, Worktree};

type Tree = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct FakeCommit {
    parents: Vec<usize>,
    tree: Tree,
    subject: String,
    author: String,
}

#[derive(Debug, Default)]
struct State {
    commits: Vec<FakeCommit>,
    branches: BTreeMap<String, usize>,
    head: String,
    index: Tree,
    merge_head: Option<usize>,
    author: String,
    calls: Vec<String>,
    fail_on: Option<String>,
    conflict_on_merge: bool,
    ignore_removals: bool,
    extra_worktrees: Vec<Worktree>,
}

/// A fake repository with a real working directory.
pub(crate) struct FakeVcs {
    dir: TempDir,
    state: RefCell<State>,
}

fn commit_id(index: usize) -> String {
    format!("c{index:039}")
}

fn tree_id(tree: &Tree) -> String {
    let mut hasher = DefaultHasher::new();
    tree.hash(&mut hasher);
    format!("t{:016x}", hasher.finish())
}

fn failure(command: &str, detail: &str) -> GuardError {
    GuardError::VcsCommandFailed {
        command: command.to_string(),
        status: Some(1),
        stderr: detail.to_string(),
    }
}

impl FakeVcs {
    /// Creates an empty repository whose unborn HEAD is `branch`.
    pub fn new(branch: &str) -> Self {
        let state = State {
            head: branch.to_string(),
            author: "Test User".to_string(),
            ..State::default()
        };
        Self {
            dir: tempfile::tempdir().unwrap(),
            state: RefCell::new(state),
        }
    }

    /// Writes `files` to disk, stages them and commits on the current branch.
    pub fn commit_files(&self, files: &[(&str, &str)], subject: &str) -> String {
        for (path, content) in files {
            self.write_file(path, content);
            self.stage_add(path).unwrap();
        }
        self.commit(subject).unwrap()
    }

    /// Sets the author recorded by subsequent commits.
    pub fn set_author(&self, author: &str) {
        self.state.borrow_mut().author = author.to_string();
    }

    /// Writes a working tree file without staging it.
    pub fn write_file(&self, path: &str, content: &str) {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    /// Reads a working tree file.
    pub fn read_file(&self, path: &str) -> Option<String> {
        fs::read_to_string(self.dir.path().join(path)).ok()
    }

    /// Mutating calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Makes the next call of `operation` fail.
    pub fn fail_on(&self, operation: &str) {
        self.state.borrow_mut().fail_on = Some(operation.to_string());
    }

    /// Makes the next merge stop with a conflict after staging the incoming tree.
    pub fn conflict_on_merge(&self) {
        self.state.borrow_mut().conflict_on_merge = true;
    }

    /// Makes `stage_remove` match nothing, like `git rm --ignore-unmatch` on a
    /// misspelled path.
    pub fn ignore_removals(&self) {
        self.state.borrow_mut().ignore_removals = true;
    }

    /// Registers another checkout of `branch`.
    pub fn add_worktree(&self, path: &str, branch: &str) {
        self.state.borrow_mut().extra_worktrees.push(Worktree {
            path: PathBuf::from(path),
            branch: Some(branch.to_string()),
        });
    }

    /// Number of commits in the object store.
    pub fn total_commits(&self) -> usize {
        self.state.borrow().commits.len()
    }

    fn record(&self, call: String) -> Result<()> {
        let operation = call.split_whitespace().next().unwrap_or_default().to_string();
        let mut state = self.state.borrow_mut();
        state.calls.push(call.clone());
        if state.fail_on.as_deref() == Some(operation.as_str()) {
            state.fail_on = None;
            return Err(failure(&call, "injected failure"));
        }
        Ok(())
    }

    fn resolve_commit(state: &State, rev: &str) -> Option<usize> {
        if let Some(base) = rev.strip_suffix('^') {
            let index = Self::resolve_commit(state, base)?;
            return state.commits[index].parents.first().copied();
        }
        if rev == "HEAD" {
            return state.branches.get(&state.head).copied();
        }
        if let Some(index) = state.branches.get(rev) {
            return Some(*index);
        }
        (0..state.commits.len()).find(|i| commit_id(*i) == rev)
    }

    fn head_tree(state: &State) -> Tree {
        state
            .branches
            .get(&state.head)
            .map(|i| state.commits[*i].tree.clone())
            .unwrap_or_default()
    }

    /// Replaces tracked working tree files of `old` with those of `new`.
    fn sync_disk(&self, old: &Tree, new: &Tree) {
        for path in old.keys().filter(|p| !new.contains_key(*p)) {
            let _ = fs::remove_file(self.dir.path().join(path));
        }
        for (path, content) in new {
            let full = self.dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, content).unwrap();
        }
    }

    fn ancestors(state: &State, start: usize) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            if seen.insert(index) {
                stack.extend(state.commits[index].parents.iter().copied());
            }
        }
        seen
    }

    fn changed(state: &State, index: usize) -> Vec<String> {
        let commit = &state.commits[index];
        let empty = Tree::new();
        let parent = commit
            .parents
            .first()
            .map_or(&empty, |p| &state.commits[*p].tree);
        let mut paths: BTreeSet<String> = BTreeSet::new();
        for (path, content) in &commit.tree {
            if parent.get(path) != Some(content) {
                paths.insert(path.clone());
            }
        }
        for path in parent.keys() {
            if !commit.tree.contains_key(path) {
                paths.insert(path.clone());
            }
        }
        paths.into_iter().collect()
    }

    fn files_on_disk(&self, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.files_on_disk(&path, out);
            } else if let Ok(relative) = path.strip_prefix(self.dir.path()) {
                let relative = relative.to_string_lossy().replace('\\', "/");
                if !relative.starts_with(".fakegit/") {
                    out.push(relative);
                }
            }
        }
    }
}

impl Vcs for FakeVcs {
    fn workdir(&self) -> &Path {
        self.dir.path()
    }

    fn git_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.dir.path().join(".fakegit").join(name))
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(Some(self.state.borrow().head.clone()))
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        Ok(self.state.borrow().branches.keys().cloned().collect())
    }

    fn create_branch(&self, name: &str, start: &str) -> Result<()> {
        self.record(format!("create_branch {name} {start}"))?;
        let mut state = self.state.borrow_mut();
        if state.branches.contains_key(name) {
            return Err(failure("git branch", "branch already exists"));
        }
        let index = Self::resolve_commit(&state, start)
            .ok_or_else(|| failure("git branch", "invalid start point"))?;
        state.branches.insert(name.to_string(), index);
        Ok(())
    }

    fn update_branch(&self, name: &str, rev: &str) -> Result<()> {
        self.record(format!("update_branch {name} {rev}"))?;
        let mut state = self.state.borrow_mut();
        if state.head == name {
            return Err(failure("git branch -f", "cannot force update the current branch"));
        }
        let index = Self::resolve_commit(&state, rev)
            .ok_or_else(|| failure("git branch -f", "invalid start point"))?;
        state.branches.insert(name.to_string(), index);
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.record(format!("delete_branch {name}"))?;
        let mut state = self.state.borrow_mut();
        if state.head == name {
            return Err(failure("git branch -D", "cannot delete the checked out branch"));
        }
        state
            .branches
            .remove(name)
            .map(drop)
            .ok_or_else(|| failure("git branch -D", "branch not found"))
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.record(format!("checkout {branch}"))?;
        let (old, new) = {
            let state = self.state.borrow();
            let index = *state
                .branches
                .get(branch)
                .ok_or_else(|| failure("git checkout", "no such branch"))?;
            (state.index.clone(), state.commits[index].tree.clone())
        };
        self.sync_disk(&old, &new);
        let mut state = self.state.borrow_mut();
        state.head = branch.to_string();
        state.index = new;
        state.merge_head = None;
        Ok(())
    }

    fn hard_reset(&self, rev: &str) -> Result<()> {
        self.record(format!("hard_reset {rev}"))?;
        let (old, new, index) = {
            let state = self.state.borrow();
            let index = Self::resolve_commit(&state, rev)
                .ok_or_else(|| failure("git reset", "unknown revision"))?;
            (state.index.clone(), state.commits[index].tree.clone(), index)
        };
        self.sync_disk(&old, &new);
        let mut state = self.state.borrow_mut();
        let head = state.head.clone();
        state.branches.insert(head, index);
        state.index = new;
        state.merge_head = None;
        Ok(())
    }

    fn list_tracked_files(&self, rev: Option<&str>) -> Result<Vec<String>> {
        let state = self.state.borrow();
        match rev {
            None => Ok(state.index.keys().cloned().collect()),
            Some(rev) => {
                let index = Self::resolve_commit(&state, rev)
                    .ok_or_else(|| failure("git ls-tree", "unknown revision"))?;
                Ok(state.commits[index].tree.keys().cloned().collect())
            }
        }
    }

    fn staged_paths(&self) -> Result<Vec<String>> {
        let state = self.state.borrow();
        let head = Self::head_tree(&state);
        Ok(state
            .index
            .iter()
            .filter(|(path, content)| head.get(*path) != Some(*content))
            .map(|(path, _)| path.clone())
            .collect())
    }

    fn stage_add(&self, path: &str) -> Result<()> {
        self.record(format!("stage_add {path}"))?;
        let content = fs::read(self.dir.path().join(path)).ok();
        let mut state = self.state.borrow_mut();
        match content {
            Some(bytes) => {
                state.index.insert(path.to_string(), bytes);
            }
            None => {
                state.index.remove(path);
            }
        }
        Ok(())
    }

    fn stage_remove(&self, path: &str, keep_working_tree: bool) -> Result<()> {
        self.record(format!("stage_remove {path}"))?;
        let mut state = self.state.borrow_mut();
        if state.ignore_removals {
            return Ok(());
        }
        let doomed: Vec<String> = state
            .index
            .keys()
            .filter(|p| *p == path || p.starts_with(&format!("{path}/")))
            .cloned()
            .collect();
        for entry in doomed {
            state.index.remove(&entry);
            if !keep_working_tree {
                let _ = fs::remove_file(self.dir.path().join(&entry));
            }
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.record(format!("commit {}", message.lines().next().unwrap_or_default()))?;
        let mut state = self.state.borrow_mut();
        let parent = state.branches.get(&state.head).copied();
        if state.merge_head.is_none() && state.index == Self::head_tree(&state) && parent.is_some()
        {
            return Err(failure("git commit", "nothing to commit"));
        }
        let mut parents: Vec<usize> = parent.into_iter().collect();
        parents.extend(state.merge_head.take());
        let commit = FakeCommit {
            parents,
            tree: state.index.clone(),
            subject: message.lines().next().unwrap_or_default().to_string(),
            author: state.author.clone(),
        };
        state.commits.push(commit);
        let index = state.commits.len() - 1;
        let head = state.head.clone();
        state.branches.insert(head, index);
        Ok(commit_id(index))
    }

    fn write_tree(&self) -> Result<String> {
        Ok(tree_id(&self.state.borrow().index))
    }

    fn merge(&self, branch: &str, flags: MergeFlags) -> Result<()> {
        self.record(format!("merge {branch}"))?;
        let (old, merged, source) = {
            let state = self.state.borrow();
            let source = *state
                .branches
                .get(branch)
                .ok_or_else(|| failure("git merge", "not something we can merge"))?;
            let mut merged = state.index.clone();
            merged.extend(state.commits[source].tree.clone());
            (state.index.clone(), merged, source)
        };
        self.sync_disk(&old, &merged);
        {
            let mut state = self.state.borrow_mut();
            state.index = merged;
            if !flags.squash {
                state.merge_head = Some(source);
            }
            if std::mem::take(&mut state.conflict_on_merge) {
                return Err(failure(
                    &format!("git merge {branch}"),
                    "CONFLICT (content): Merge conflict in README.md",
                ));
            }
        }
        if !flags.squash && !flags.no_commit {
            self.commit(&format!("Merge branch '{branch}'"))?;
        }
        Ok(())
    }

    fn abort_merge(&self) -> Result<()> {
        self.record("abort_merge".to_string())?;
        let (old, new) = {
            let state = self.state.borrow();
            (state.index.clone(), Self::head_tree(&state))
        };
        self.sync_disk(&old, &new);
        let mut state = self.state.borrow_mut();
        state.index = new;
        state.merge_head = None;
        Ok(())
    }

    fn resolve_ref(&self, rev: &str) -> Result<Option<String>> {
        let state = self.state.borrow();
        if let Some(base) = rev.strip_suffix("^{tree}") {
            return Ok(Self::resolve_commit(&state, base).map(|i| tree_id(&state.commits[i].tree)));
        }
        Ok(Self::resolve_commit(&state, rev).map(commit_id))
    }

    fn log(&self, range: &str) -> Result<Vec<CommitRecord>> {
        let state = self.state.borrow();
        let (hide, show) = match range.split_once("..") {
            Some((start, end)) => (Some(start), end),
            None => (None, range),
        };
        let Some(tip) = Self::resolve_commit(&state, show) else {
            return Err(failure("git log", "unknown revision"));
        };
        let hidden = hide
            .and_then(|rev| Self::resolve_commit(&state, rev))
            .map(|i| Self::ancestors(&state, i))
            .unwrap_or_default();
        let base = DateTime::parse_from_rfc3339("2024-01-01T12:00:00+00:00")
            .map_err(|e| failure("git log", &e.to_string()))?;

        Ok(Self::ancestors(&state, tip)
            .into_iter()
            .filter(|i| !hidden.contains(i) && state.commits[*i].parents.len() < 2)
            .map(|i| {
                let commit = &state.commits[i];
                CommitRecord {
                    hash: commit_id(i),
                    author: commit.author.clone(),
                    date: base + Duration::minutes(i as i64),
                    subject: commit.subject.clone(),
                    changed_paths: Self::changed(&state, i),
                }
            })
            .collect())
    }

    fn diff_tree(&self, commit: &str) -> Result<Vec<String>> {
        let state = self.state.borrow();
        let index = Self::resolve_commit(&state, commit)
            .ok_or_else(|| failure("git diff-tree", "unknown revision"))?;
        Ok(Self::changed(&state, index))
    }

    fn list_worktrees(&self) -> Result<Vec<Worktree>> {
        let state = self.state.borrow();
        let mut worktrees = vec![Worktree {
            path: self.dir.path().to_path_buf(),
            branch: Some(state.head.clone()),
        }];
        worktrees.extend(state.extra_worktrees.iter().cloned());
        Ok(worktrees)
    }

    fn read_blob(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.borrow();
        Ok(Self::resolve_commit(&state, rev).and_then(|i| state.commits[i].tree.get(path).cloned()))
    }

    fn history_paths(&self) -> Result<Vec<String>> {
        let state = self.state.borrow();
        let paths: BTreeSet<String> = (0..state.commits.len())
            .flat_map(|i| Self::changed(&state, i))
            .collect();
        Ok(paths.into_iter().collect())
    }

    fn commit_count(&self) -> Result<usize> {
        Ok(self.state.borrow().commits.len())
    }

    fn working_tree_changes(&self, include_untracked: bool) -> Result<Vec<FileStatus>> {
        let state = self.state.borrow();
        let head = Self::head_tree(&state);
        let mut changes = Vec::new();
        for (path, content) in &state.index {
            let disk = fs::read(self.dir.path().join(path)).ok();
            let staged = head.get(path) != Some(content);
            let unstaged = disk.as_ref() != Some(content);
            if staged || unstaged {
                let index_flag = if staged { 'M' } else { ' ' };
                let tree_flag = match disk {
                    None => 'D',
                    Some(_) if unstaged => 'M',
                    Some(_) => ' ',
                };
                changes.push(FileStatus {
                    status: format!("{index_flag}{tree_flag}"),
                    file: path.clone(),
                });
            }
        }
        if include_untracked {
            let mut on_disk = Vec::new();
            self.files_on_disk(self.dir.path(), &mut on_disk);
            on_disk.sort();
            for path in on_disk {
                if !state.index.contains_key(&path) {
                    changes.push(FileStatus {
                        status: "??".to_string(),
                        file: path,
                    });
                }
            }
        }
        Ok(changes)
    }

    fn mirror_clone(&self, dest: &Path) -> Result<()> {
        self.record(format!("mirror_clone {}", dest.display()))?;
        fs::create_dir_all(dest)?;
        fs::write(dest.join("HEAD"), "ref: refs/heads/main\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_swaps_tracked_files_on_disk() {
        let vcs = FakeVcs::new("private");
        vcs.commit_files(&[("a.txt", "a"), ("secret.txt", "s")], "init");
        vcs.create_branch("main", "private").unwrap();
        vcs.checkout("main").unwrap();
        vcs.stage_remove("secret.txt", false).unwrap();
        vcs.commit("drop").unwrap();
        assert!(vcs.read_file("secret.txt").is_none());

        vcs.checkout("private").unwrap();
        assert_eq!(vcs.read_file("secret.txt").as_deref(), Some("s"));
        assert_eq!(vcs.list_tracked_files(Some("main")).unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn log_range_excludes_base_history() {
        let vcs = FakeVcs::new("main");
        vcs.commit_files(&[("a", "1")], "base");
        vcs.create_branch("topic", "main").unwrap();
        vcs.checkout("topic").unwrap();
        vcs.commit_files(&[("b", "1")], "one");
        vcs.commit_files(&[("c", "1")], "two");
        let log = vcs.log("main..topic").unwrap();
        let subjects: Vec<&str> = log.iter().map(|c| c.subject.as_str()).collect();
        assert_eq!(subjects, vec!["one", "two"]);
        assert_eq!(log[1].changed_paths, vec!["c"]);
    }

    #[test]
    fn commit_without_changes_fails() {
        let vcs = FakeVcs::new("main");
        vcs.commit_files(&[("a", "1")], "base");
        assert!(vcs.commit("again").is_err());
    }
}
