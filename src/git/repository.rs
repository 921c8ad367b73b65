//! Git repository operations

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use git2::{BranchType, ErrorCode, Repository, Sort, Status, StatusOptions};
use tracing::debug;

use crate::error::{GuardError, Result};
use crate::git::{CommitRecord, FileStatus, MergeFlags, Vcs, Worktree, SKIP_HOOKS_ENV};

/// Git repository wrapper
pub struct GitRepository {
    repo: Repository,
    workdir: PathBuf,
    skip_hooks: bool,
}

impl GitRepository {
    /// Open the repository containing the current directory
    pub fn open() -> Result<Self> {
        Self::open_at(".")
    }

    /// Open the repository containing `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::discover(path)
            .map_err(|_| GuardError::NotVersionControlled(path.to_path_buf()))?;
        Self::from_repository(repo, path)
    }

    /// Initialise a new repository at `path`
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;
        Self::from_repository(repo, path)
    }

    fn from_repository(repo: Repository, path: &Path) -> Result<Self> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| GuardError::NotVersionControlled(path.to_path_buf()))?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir,
            skip_hooks: false,
        })
    }

    /// Marks every spawned git process so installed repoguard hooks stay inert.
    pub fn with_hooks_disabled(mut self) -> Self {
        self.skip_hooks = true;
        self
    }

    /// Get access to the underlying git2::Repository
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.workdir).args(args);
        if self.skip_hooks {
            cmd.env(SKIP_HOOKS_ENV, "1");
        }
        cmd
    }

    fn output(&self, mut cmd: Command, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "Running git");
        cmd.output().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GuardError::ExternalToolUnavailable {
                tool: "git".to_string(),
                hint: "install git and make sure it is on PATH".to_string(),
            },
            _ => GuardError::Io(e),
        })
    }

    /// Runs git and returns stdout, failing on a non-zero exit.
    fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.output(self.command(args), args)?;
        check_status(args, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Runs git with literal pathspecs so globbing characters in paths are not expanded.
    fn git_literal(&self, args: &[&str]) -> Result<String> {
        let mut cmd = self.command(args);
        cmd.env("GIT_LITERAL_PATHSPECS", "1");
        let output = self.output(cmd, args)?;
        check_status(args, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn commit_record(&self, oid: git2::Oid) -> Result<CommitRecord> {
        let commit = self.repo.find_commit(oid)?;
        CommitRecord::from_git_commit(&self.repo, &commit)
    }
}

fn check_status(args: &[&str], output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    };
    Err(GuardError::VcsCommandFailed {
        command: format!("git {}", args.join(" ")),
        status: output.status.code(),
        stderr: detail,
    })
}

fn split_nul(output: &str) -> Vec<String> {
    output
        .split('\0')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl Vcs for GitRepository {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn git_path(&self, name: &str) -> Result<PathBuf> {
        let out = self.git(&["rev-parse", "--git-path", name])?;
        Ok(self.workdir.join(out.trim()))
    }

    fn current_branch(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(ToString::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // Before the first commit HEAD is a symbolic ref to a missing branch.
                let head = self.repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(ToString::to_string))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.repo.find_branch(name, BranchType::Local).is_ok())
    }

    fn create_branch(&self, name: &str, start: &str) -> Result<()> {
        self.git(&["branch", name, start]).map(drop)
    }

    fn update_branch(&self, name: &str, rev: &str) -> Result<()> {
        self.git(&["branch", "-f", name, rev]).map(drop)
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.git(&["branch", "-D", name]).map(drop)
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", "-q", branch, "--"]).map(drop)
    }

    fn hard_reset(&self, rev: &str) -> Result<()> {
        self.git(&["reset", "-q", "--hard", rev, "--"]).map(drop)
    }

    fn list_tracked_files(&self, rev: Option<&str>) -> Result<Vec<String>> {
        let out = match rev {
            None => self.git(&["ls-files", "-z"])?,
            Some(rev) => self.git(&["ls-tree", "-r", "-z", "--name-only", "--full-tree", rev])?,
        };
        Ok(split_nul(&out))
    }

    fn staged_paths(&self) -> Result<Vec<String>> {
        let out = self.git(&["diff", "--cached", "--name-only", "-z", "--diff-filter=d"])?;
        Ok(split_nul(&out))
    }

    fn stage_add(&self, path: &str) -> Result<()> {
        self.git_literal(&["add", "--", path]).map(drop)
    }

    fn stage_remove(&self, path: &str, keep_working_tree: bool) -> Result<()> {
        let mut args = vec!["rm", "-r", "-q", "-f", "--ignore-unmatch"];
        if keep_working_tree {
            args.push("--cached");
        }
        args.extend(["--", path]);
        self.git_literal(&args).map(drop)
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.git(&["commit", "-q", "-m", message])?;
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn write_tree(&self) -> Result<String> {
        Ok(self.git(&["write-tree"])?.trim().to_string())
    }

    fn merge(&self, branch: &str, flags: MergeFlags) -> Result<()> {
        let mut args = vec!["merge", "--no-edit"];
        if flags.squash {
            args.push("--squash");
        } else if flags.no_ff {
            args.push("--no-ff");
        }
        if flags.no_commit && !flags.squash {
            args.push("--no-commit");
        }
        args.push(branch);
        self.git(&args).map(drop)
    }

    fn abort_merge(&self) -> Result<()> {
        self.git(&["merge", "--abort"]).map(drop)
    }

    fn resolve_ref(&self, rev: &str) -> Result<Option<String>> {
        match self.repo.revparse_single(rev) {
            Ok(object) => Ok(Some(object.id().to_string())),
            Err(e) => {
                debug!(rev, error = %e, "Revision did not resolve");
                Ok(None)
            }
        }
    }

    fn log(&self, range: &str) -> Result<Vec<CommitRecord>> {
        let mut walker = self.repo.revwalk()?;
        walker.set_sorting(Sort::TOPOLOGICAL)?;
        if let Some((start, end)) = range.split_once("..") {
            let end = if end.is_empty() { "HEAD" } else { end };
            walker.push(self.repo.revparse_single(end)?.peel_to_commit()?.id())?;
            if !start.is_empty() {
                walker.hide(self.repo.revparse_single(start)?.peel_to_commit()?.id())?;
            }
        } else {
            walker.push(self.repo.revparse_single(range)?.peel_to_commit()?.id())?;
        }

        let mut commits = Vec::new();
        for oid in walker {
            let oid = oid?;
            if self.repo.find_commit(oid)?.parent_count() > 1 {
                continue;
            }
            commits.push(self.commit_record(oid)?);
        }

        // Walk order is newest first.
        commits.reverse();
        Ok(commits)
    }

    fn diff_tree(&self, commit: &str) -> Result<Vec<String>> {
        let commit = self.repo.revparse_single(commit)?.peel_to_commit()?;
        super::commit::changed_paths(&self.repo, &commit)
    }

    fn list_worktrees(&self) -> Result<Vec<Worktree>> {
        let out = self.git(&["worktree", "list", "--porcelain"])?;
        let mut worktrees = Vec::new();
        let mut current: Option<Worktree> = None;
        for line in out.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                worktrees.extend(current.take());
                current = Some(Worktree {
                    path: PathBuf::from(path),
                    branch: None,
                });
            } else if let Some(reference) = line.strip_prefix("branch ") {
                if let Some(worktree) = current.as_mut() {
                    worktree.branch = Some(
                        reference
                            .strip_prefix("refs/heads/")
                            .unwrap_or(reference)
                            .to_string(),
                    );
                }
            }
        }
        worktrees.extend(current);
        Ok(worktrees)
    }

    fn read_blob(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let Ok(object) = self.repo.revparse_single(rev) else {
            return Ok(None);
        };
        let tree = object.peel_to_tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = entry.to_object(&self.repo)?;
        Ok(object.as_blob().map(|blob| blob.content().to_vec()))
    }

    fn history_paths(&self) -> Result<Vec<String>> {
        let out = self.git(&["log", "--all", "--name-only", "--format=", "-z"])?;
        let paths: BTreeSet<String> = split_nul(&out).into_iter().collect();
        Ok(paths.into_iter().collect())
    }

    fn commit_count(&self) -> Result<usize> {
        let out = self.git(&["rev-list", "--all", "--count"])?;
        out.trim().parse().map_err(|_| GuardError::VcsCommandFailed {
            command: "git rev-list --all --count".to_string(),
            status: Some(0),
            stderr: format!("unexpected output: {}", out.trim()),
        })
    }

    fn working_tree_changes(&self, include_untracked: bool) -> Result<Vec<FileStatus>> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(include_untracked)
            .recurse_untracked_dirs(include_untracked)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = self.repo.statuses(Some(&mut options))?;

        let mut changes = Vec::new();
        for entry in statuses.iter() {
            if let Some(path) = entry.path() {
                changes.push(FileStatus {
                    status: format_status_flags(entry.status()),
                    file: path.to_string(),
                });
            }
        }
        Ok(changes)
    }

    fn mirror_clone(&self, dest: &Path) -> Result<()> {
        let source = self.workdir.to_string_lossy().into_owned();
        let dest = dest.to_string_lossy().into_owned();
        self.git(&["clone", "--quiet", "--mirror", &source, &dest])
            .map(drop)
    }
}

/// Formats status flags the way `git status --short` does.
fn format_status_flags(flags: Status) -> String {
    if flags.contains(Status::WT_NEW) {
        return "??".to_string();
    }

    let mut status = String::new();

    if flags.contains(Status::INDEX_NEW) {
        status.push('A');
    } else if flags.contains(Status::INDEX_MODIFIED) {
        status.push('M');
    } else if flags.contains(Status::INDEX_DELETED) {
        status.push('D');
    } else if flags.contains(Status::INDEX_RENAMED) {
        status.push('R');
    } else if flags.contains(Status::INDEX_TYPECHANGE) {
        status.push('T');
    } else {
        status.push(' ');
    }

    if flags.contains(Status::WT_MODIFIED) {
        status.push('M');
    } else if flags.contains(Status::WT_DELETED) {
        status.push('D');
    } else if flags.contains(Status::WT_TYPECHANGE) {
        status.push('T');
    } else if flags.contains(Status::WT_RENAMED) {
        status.push('R');
    } else {
        status.push(' ');
    }

    status
}
