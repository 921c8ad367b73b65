use anyhow::Result;
use git2::Repository;
use repoguard::checkout::CheckoutSynchronizer;
use repoguard::config::Policy;
use repoguard::git::{GitRepository, Vcs};
use repoguard::guard::{setup_guardrails, validate_commit, HookKind};
use repoguard::guard::hooks::{HookAction, HOOK_MARKER};
use repoguard::merge::{safe_merge, MergeOutcome, SafeMergeOptions};
use repoguard::partition::BranchPartitioner;
use repoguard::GuardError;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test setup that creates a temporary git repository on a `private` branch
struct TestRepo {
    _temp_dir: TempDir,
    repo_path: PathBuf,
    vcs: GitRepository,
    policy: Policy,
}

impl TestRepo {
    fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let repo_path = temp_dir.path().to_path_buf();

        // Initialize git repository with an unborn private branch
        let repo = Repository::init(&repo_path)?;
        repo.set_head("refs/heads/private")?;

        // Configure git user for commits
        let mut config = repo.config()?;
        config.set_str("user.name", "Test User")?;
        config.set_str("user.email", "test@example.com")?;
        config.set_bool("commit.gpgsign", false)?;

        let vcs = GitRepository::open_at(&repo_path)?.with_hooks_disabled();
        Ok(TestRepo {
            _temp_dir: temp_dir,
            repo_path,
            vcs,
            policy: Policy::defaults()?,
        })
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.repo_path.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, content)?;
        Ok(())
    }

    fn commit_files(&self, files: &[(&str, &str)], message: &str) -> Result<String> {
        for (path, content) in files {
            self.write(path, content)?;
            self.vcs.stage_add(path)?;
        }
        Ok(self.vcs.commit(message)?)
    }

    /// A private branch with mixed content and a `main` derived from it
    fn published() -> Result<Self> {
        let repo = Self::new()?;
        repo.commit_files(
            &[
                ("README.md", "# project\n"),
                ("src/lib.rs", "pub fn answer() -> u32 { 42 }\n"),
                ("CLAUDE.md", "assistant notes\n"),
                ("private/docs/plan.md", "roadmap\n"),
                ("secrets/api.key", "hunter2\n"),
                ("debug.log", "trace\n"),
            ],
            "Initial import",
        )?;
        BranchPartitioner::new(&repo.vcs, &repo.policy).create_clean_public_branch("main", "private")?;
        Ok(repo)
    }

    fn partitioner(&self) -> BranchPartitioner<'_, GitRepository> {
        BranchPartitioner::new(&self.vcs, &self.policy)
    }

    /// Runs git the way a user would, with installed hooks active
    fn git(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<Output> {
        let home = self.repo_path.join(".git/test-home");
        fs::create_dir_all(&home)?;
        Ok(Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .env_remove("REPOGUARD_SKIP_HOOKS")
            .env_remove("REPOGUARD_OVERRIDE")
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &home)
            .envs(envs.iter().copied())
            .output()?)
    }
}

#[test]
fn test_publish_derives_clean_public_branch() -> Result<()> {
    let repo = TestRepo::published()?;

    assert_eq!(repo.vcs.current_branch()?.as_deref(), Some("private"));
    assert_eq!(
        repo.vcs.list_tracked_files(Some("main"))?,
        vec![".gitignore", "README.md", "src/lib.rs"]
    );
    assert!(repo
        .vcs
        .list_tracked_files(Some("private"))?
        .contains(&"CLAUDE.md".to_string()));
    assert!(repo.partitioner().verify("main")?.is_clean());

    let gitignore = repo.vcs.read_blob("main", ".gitignore")?.unwrap();
    let gitignore = String::from_utf8(gitignore)?;
    assert!(gitignore.contains("CLAUDE.md"));
    assert!(gitignore.contains("*.log"));

    let subject = &repo.vcs.log("private..main")?[0].subject;
    assert_eq!(subject, "Remove 4 private file(s) from public branch");
    Ok(())
}

#[test]
fn test_publish_is_idempotent() -> Result<()> {
    let repo = TestRepo::published()?;
    let first = repo.vcs.resolve_ref("main")?;

    let report = repo.partitioner().create_clean_public_branch("main", "private")?;
    assert!(report.reused_previous);
    assert_eq!(report.commit, None);
    assert_eq!(repo.vcs.resolve_ref("main")?, first);

    repo.commit_files(&[("src/extra.rs", "// more\n")], "Add extra module")?;
    let report = repo.partitioner().create_clean_public_branch("main", "private")?;
    assert!(!report.reused_previous);
    assert!(report.commit.is_some());
    assert!(repo
        .vcs
        .list_tracked_files(Some("main"))?
        .contains(&"src/extra.rs".to_string()));
    Ok(())
}

#[test]
fn test_commit_guard_checks_staged_files() -> Result<()> {
    let repo = TestRepo::published()?;

    repo.write("src/private_helper.rs", "// internal\n")?;
    repo.vcs.stage_add("src/private_helper.rs")?;
    assert!(validate_commit(&repo.vcs, &repo.policy)?.is_ok());
    repo.vcs.commit("Add helper on private")?;

    repo.vcs.checkout("main")?;
    repo.write("src/private_notes.rs", "// internal\n")?;
    repo.vcs.stage_add("src/private_notes.rs")?;
    let check = validate_commit(&repo.vcs, &repo.policy)?;
    assert!(!check.is_ok());
    assert_eq!(check.violations[0].path, "src/private_notes.rs");
    Ok(())
}

#[test]
fn test_safe_merge_strips_private_content() -> Result<()> {
    let repo = TestRepo::published()?;
    repo.commit_files(
        &[
            ("src/feature.rs", "pub fn feature() {}\n"),
            ("private/docs/design.md", "internal design\n"),
        ],
        "Add feature with design notes",
    )?;

    repo.vcs.checkout("main")?;
    let outcome = safe_merge(&repo.vcs, &repo.policy, "private", SafeMergeOptions::default())?;
    let MergeOutcome::Merged(report) = outcome else {
        panic!("expected a merge");
    };
    assert!(report.committed);
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].path, "private/docs/design.md");

    let tracked = repo.vcs.list_tracked_files(Some("main"))?;
    assert!(tracked.contains(&"src/feature.rs".to_string()));
    assert!(!tracked.iter().any(|p| p.starts_with("private/")));
    assert!(repo.partitioner().verify("main")?.is_clean());
    Ok(())
}

#[test]
fn test_safe_merge_preview_changes_nothing() -> Result<()> {
    let repo = TestRepo::published()?;
    repo.commit_files(&[("src/feature.rs", "pub fn feature() {}\n")], "Add feature")?;
    repo.vcs.checkout("main")?;
    let before = repo.vcs.resolve_ref("main")?;

    let options = SafeMergeOptions {
        preview: true,
        ..SafeMergeOptions::default()
    };
    let MergeOutcome::Preview(preview) =
        safe_merge(&repo.vcs, &repo.policy, "private", options)?
    else {
        panic!("expected a preview");
    };
    assert_eq!(preview.commits.len(), 1);
    assert_eq!(preview.commits[0].subject, "Add feature");
    assert_eq!(repo.vcs.resolve_ref("main")?, before);
    Ok(())
}

#[test]
fn test_verify_reports_private_content() -> Result<()> {
    let repo = TestRepo::new()?;
    repo.commit_files(&[("README.md", "hi\n"), ("CLAUDE.md", "notes\n")], "Initial")?;

    let report = repo.partitioner().verify("private")?;
    assert_eq!(report.tracked_files, 2);
    let err = report.into_result().unwrap_err();
    assert!(matches!(err, GuardError::VerificationFailed { .. }));
    assert_eq!(err.violations()[0].path, "CLAUDE.md");
    Ok(())
}

#[test]
fn test_setup_installs_hooks() -> Result<()> {
    let repo = TestRepo::new()?;
    repo.commit_files(&[("README.md", "hi\n")], "Initial")?;

    let report = setup_guardrails(&repo.vcs, &repo.policy, false, "repoguard")?;
    assert_eq!(report.hooks.len(), 2);
    assert!(report.hooks.iter().all(|h| h.action == HookAction::Installed));

    let hook = repo.repo_path.join(".git/hooks").join(HookKind::PreCommit.file_name());
    assert!(fs::read_to_string(&hook)?.contains(HOOK_MARKER));
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        assert_ne!(fs::metadata(&hook)?.permissions().mode() & 0o111, 0);
    }

    let exclude = fs::read_to_string(repo.repo_path.join(".git/info/exclude"))?;
    assert!(exclude.contains("test-runs/"));

    // A hook written by someone else survives unless forced
    let post = repo.repo_path.join(".git/hooks/post-checkout");
    fs::write(&post, "#!/bin/sh\necho custom\n")?;
    let report = setup_guardrails(&repo.vcs, &repo.policy, false, "repoguard")?;
    assert_eq!(report.hooks[0].action, HookAction::Updated);
    assert_eq!(report.hooks[1].action, HookAction::Skipped);
    assert_eq!(fs::read_to_string(&post)?, "#!/bin/sh\necho custom\n");

    let report = setup_guardrails(&repo.vcs, &repo.policy, true, "repoguard")?;
    assert_eq!(report.hooks[1].action, HookAction::Replaced);
    Ok(())
}

#[test]
fn test_checkout_restores_private_files_on_public_branch() -> Result<()> {
    let repo = TestRepo::published()?;
    repo.vcs.checkout("main")?;
    assert!(!repo.repo_path.join("CLAUDE.md").exists());

    let report = CheckoutSynchronizer::new(&repo.vcs, &repo.policy).on_checkout("main")?;
    assert_eq!(report.restored, vec!["CLAUDE.md", "private/docs/plan.md"]);
    assert_eq!(
        fs::read_to_string(repo.repo_path.join("CLAUDE.md"))?,
        "assistant notes\n"
    );
    assert!(report.exclude_updated);

    // Restored files stay out of the way of the next commit
    let tracked_changes = repo.vcs.working_tree_changes(false)?;
    assert!(tracked_changes.is_empty());
    let exclude = fs::read_to_string(repo.repo_path.join(".git/info/exclude"))?;
    assert!(exclude.contains("CLAUDE.md"));
    Ok(())
}

#[test]
fn test_conflicted_merge_leaves_no_private_content_staged() -> Result<()> {
    let repo = TestRepo::published()?;
    repo.commit_files(
        &[
            ("README.md", "# private readme\n"),
            ("private/docs/design.md", "internal design\n"),
        ],
        "Rework readme with design notes",
    )?;
    repo.vcs.checkout("main")?;
    repo.commit_files(&[("README.md", "# public readme\n")], "Polish readme")?;
    let before = repo.vcs.resolve_ref("main")?;

    let err = safe_merge(&repo.vcs, &repo.policy, "private", SafeMergeOptions::default())
        .unwrap_err();
    assert!(matches!(err, GuardError::VcsCommandFailed { .. }));

    assert_eq!(repo.vcs.resolve_ref("MERGE_HEAD")?, None);
    assert_eq!(repo.vcs.resolve_ref("main")?, before);
    assert!(repo.vcs.staged_paths()?.is_empty());
    assert!(!repo
        .vcs
        .list_tracked_files(None)?
        .contains(&"private/docs/design.md".to_string()));
    assert!(!repo.repo_path.join("private/docs/design.md").exists());
    assert_eq!(
        fs::read_to_string(repo.repo_path.join("README.md"))?,
        "# public readme\n"
    );
    Ok(())
}

#[test]
fn test_publish_keeps_paths_with_surrounding_whitespace() -> Result<()> {
    let repo = TestRepo::new()?;
    repo.commit_files(
        &[("README.md", "hi\n"), ("CLAUDE.md ", "not the notes file\n")],
        "Initial",
    )?;

    let report = repo.partitioner().create_clean_public_branch("main", "private")?;
    assert!(report.removed.is_empty());
    assert!(report.verification.is_clean());
    assert_eq!(
        repo.vcs.list_tracked_files(Some("main"))?,
        vec!["CLAUDE.md ", "README.md"]
    );
    Ok(())
}

#[test]
fn test_installed_hooks_guard_commits_and_restore_on_checkout() -> Result<()> {
    let repo = TestRepo::published()?;
    setup_guardrails(
        &repo.vcs,
        &repo.policy,
        false,
        env!("CARGO_BIN_EXE_repoguard"),
    )?;

    let output = repo.git(&["checkout", "-q", "main"], &[])?;
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(repo.repo_path.join("CLAUDE.md"))?,
        "assistant notes\n"
    );

    repo.write("src/private_notes.rs", "// internal\n")?;
    assert!(repo.git(&["add", "-f", "CLAUDE.md", "src/private_notes.rs"], &[])?.status.success());
    let blocked = repo.git(&["commit", "-q", "-m", "Leak notes"], &[])?;
    assert!(!blocked.status.success());
    let stderr = String::from_utf8_lossy(&blocked.stderr);
    assert!(stderr.contains("CLAUDE.md"));
    assert!(stderr.contains("src/private_notes.rs"));
    let tip = repo.vcs.resolve_ref("main")?;

    let skipped = repo.git(
        &["commit", "-q", "-m", "Leak notes"],
        &[("REPOGUARD_SKIP_HOOKS", "1")],
    )?;
    assert!(skipped.status.success());
    assert_ne!(repo.vcs.resolve_ref("main")?, tip);

    repo.write("src/private_more.rs", "// internal\n")?;
    assert!(repo.git(&["add", "-f", "src/private_more.rs"], &[])?.status.success());
    let overridden = repo.git(
        &["commit", "-q", "-m", "Deliberate"],
        &[("REPOGUARD_OVERRIDE", "1")],
    )?;
    assert!(overridden.status.success());
    Ok(())
}
