//! Pre-commit enforcement.

use serde::Serialize;
use tracing::{debug, warn};

use crate::branch::Classification;
use crate::config::Policy;
use crate::error::Result;
use crate::git::Vcs;
use crate::rules::SensitivityVerdict;

pub mod hooks;

pub use hooks::{check_status, setup_guardrails, HookKind, HookState, SetupReport, StatusReport};

/// Environment variable that lets a single commit bypass the guard.
pub const OVERRIDE_ENV: &str = "REPOGUARD_OVERRIDE";

/// Result of checking staged paths against a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitCheck {
    /// Branch the commit would land on.
    pub branch: String,
    /// How that branch is classified.
    pub classification: Classification,
    /// Number of staged paths inspected.
    pub staged: usize,
    /// Staged paths that may not be committed here.
    pub violations: Vec<SensitivityVerdict>,
}

impl CommitCheck {
    /// Whether the commit may proceed.
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Validates staged content against the branch it is committed to.
#[derive(Debug, Clone, Copy)]
pub struct CommitGuard<'a> {
    policy: &'a Policy,
}

impl<'a> CommitGuard<'a> {
    /// Creates a guard over `policy`.
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    /// Checks `staged` paths for a commit on `branch`.
    ///
    /// Private branches accept anything; every other branch rejects any path
    /// matched by the always-private or exclude-from-public rules.
    pub fn validate<S: AsRef<str>>(&self, branch: &str, staged: &[S]) -> CommitCheck {
        let classification = self.policy.classifier.classify(branch);
        let violations = if classification.is_public() {
            self.policy.guard_matcher().scan(staged.iter().map(|path| path.as_ref()))
        } else {
            Vec::new()
        };
        debug!(
            branch,
            %classification,
            staged = staged.len(),
            violations = violations.len(),
            "Validated staged paths"
        );
        CommitCheck {
            branch: branch.to_string(),
            classification,
            staged: staged.len(),
            violations,
        }
    }
}

/// Whether `REPOGUARD_OVERRIDE` asks to bypass the guard.
pub fn override_requested() -> bool {
    std::env::var(OVERRIDE_ENV)
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Validates the staged content of the current checkout.
///
/// A detached HEAD has no branch name and is checked as an unknown, and
/// therefore public, branch.
pub fn validate_commit<V: Vcs>(vcs: &V, policy: &Policy) -> Result<CommitCheck> {
    let branch = vcs.current_branch()?.unwrap_or_else(|| {
        warn!("HEAD is detached; checking staged files as if on a public branch");
        "HEAD".to_string()
    });
    let staged = vcs.staged_paths()?;
    Ok(CommitGuard::new(policy).validate(&branch, &staged))
}
