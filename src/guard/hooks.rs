//! Hook installation and guardrail status.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::branch::Classification;
use crate::checkout::CheckoutSynchronizer;
use crate::config::Policy;
use crate::error::Result;
use crate::git::{Vcs, SKIP_HOOKS_ENV};
use crate::ignore;
use crate::rules::SensitivityVerdict;

/// Marker line identifying hooks written by repoguard.
pub const HOOK_MARKER: &str = "# repoguard-managed hook";

/// Hooks repoguard installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    /// Blocks commits of private content on public branches.
    PreCommit,
    /// Restores or hides private files after a branch switch.
    PostCheckout,
}

impl HookKind {
    /// Every hook kind, in installation order.
    pub const ALL: [Self; 2] = [Self::PreCommit, Self::PostCheckout];

    /// File name inside the hooks directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::PostCheckout => "post-checkout",
        }
    }

    /// Shell script that delegates to `program hook <name>`.
    ///
    /// The pre-commit hook fails closed when the program is missing; the
    /// post-checkout hook never blocks a checkout.
    pub fn script(self, program: &str) -> String {
        let name = self.file_name();
        let missing = match self {
            Self::PreCommit => {
                "    echo \"repoguard: '$REPOGUARD_BIN' not found; refusing to commit unchecked.\" >&2\n    echo \"repoguard: install it, or bypass once with 'git commit --no-verify'.\" >&2\n    exit 1"
            }
            Self::PostCheckout => "    exit 0",
        };
        format!(
            "#!/bin/sh\n{HOOK_MARKER}\n[ \"${SKIP_HOOKS_ENV}\" = \"1\" ] && exit 0\nREPOGUARD_BIN='{program}'\nif ! command -v \"$REPOGUARD_BIN\" >/dev/null 2>&1; then\n{missing}\nfi\nexec \"$REPOGUARD_BIN\" hook {name} \"$@\"\n"
        )
    }
}

/// Installation state of one hook file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookState {
    /// No hook file.
    Missing,
    /// A hook written by repoguard.
    Managed,
    /// Some other hook occupies the slot.
    Foreign,
}

/// What `setup_guardrails` did with one hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookAction {
    /// Written where nothing existed.
    Installed,
    /// Our own hook rewritten.
    Updated,
    /// A foreign hook overwritten because `force` was set.
    Replaced,
    /// A foreign hook left in place.
    Skipped,
}

/// Outcome for one hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookOutcome {
    /// Which hook.
    pub hook: HookKind,
    /// Where it lives.
    pub path: PathBuf,
    /// What happened.
    pub action: HookAction,
}

/// Result of installing guardrails.
#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    /// Per-hook outcome.
    pub hooks: Vec<HookOutcome>,
    /// Current branch when setup ran.
    pub branch: Option<String>,
    /// Local exclude file that was configured.
    pub exclude_file: PathBuf,
}

/// Snapshot of guardrail state for the current checkout.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Current branch, `None` when detached.
    pub branch: Option<String>,
    /// Classification of the current branch.
    pub classification: Classification,
    /// State of each hook.
    pub hooks: Vec<(HookKind, HookState)>,
    /// Whether the local exclude file has a repoguard block.
    pub excludes_configured: bool,
    /// Paths staged for commit.
    pub staged_files: Vec<String>,
    /// Staged paths the pre-commit hook would reject.
    pub private_files_staged: Vec<SensitivityVerdict>,
}

impl StatusReport {
    /// Whether every hook is installed and managed by repoguard.
    pub fn fully_protected(&self) -> bool {
        self.hooks
            .iter()
            .all(|(_, state)| *state == HookState::Managed)
    }
}

fn hook_path<V: Vcs>(vcs: &V, kind: HookKind) -> Result<PathBuf> {
    Ok(vcs.git_path("hooks")?.join(kind.file_name()))
}

fn state_of(path: &Path) -> HookState {
    match fs::read_to_string(path) {
        Ok(content) if content.contains(HOOK_MARKER) => HookState::Managed,
        Ok(_) => HookState::Foreign,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => HookState::Missing,
        // Unreadable (binary or permission-restricted) hooks are still someone else's.
        Err(_) => HookState::Foreign,
    }
}

/// Reports whether `kind` is installed.
pub fn hook_state<V: Vcs>(vcs: &V, kind: HookKind) -> Result<HookState> {
    Ok(state_of(&hook_path(vcs, kind)?))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Installs the pre-commit and post-checkout hooks and configures local excludes.
///
/// `program` is the command the hooks execute. Hooks written by someone else
/// are left alone unless `force` is set.
pub fn setup_guardrails<V: Vcs>(
    vcs: &V,
    policy: &Policy,
    force: bool,
    program: &str,
) -> Result<SetupReport> {
    let mut hooks = Vec::new();
    for kind in HookKind::ALL {
        let path = hook_path(vcs, kind)?;
        let action = match state_of(&path) {
            HookState::Missing => HookAction::Installed,
            HookState::Managed => HookAction::Updated,
            HookState::Foreign if force => HookAction::Replaced,
            HookState::Foreign => {
                warn!(hook = kind.file_name(), path = %path.display(), "Existing hook left in place; use --force to replace it");
                hooks.push(HookOutcome {
                    hook: kind,
                    path,
                    action: HookAction::Skipped,
                });
                continue;
            }
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, kind.script(program))?;
        make_executable(&path)?;
        info!(hook = kind.file_name(), ?action, "Hook written");
        hooks.push(HookOutcome {
            hook: kind,
            path,
            action,
        });
    }

    let branch = vcs.current_branch()?;
    let synchronizer = CheckoutSynchronizer::new(vcs, policy);
    let classification = policy.classifier.classify(branch.as_deref().unwrap_or("HEAD"));
    synchronizer.update_local_excludes(classification)?;

    Ok(SetupReport {
        hooks,
        branch,
        exclude_file: vcs.git_path("info/exclude")?,
    })
}

/// Reports hooks, excludes and staged content for the current checkout.
pub fn check_status<V: Vcs>(vcs: &V, policy: &Policy) -> Result<StatusReport> {
    let branch = vcs.current_branch()?;
    let check = super::validate_commit(vcs, policy)?;
    let hooks = HookKind::ALL
        .into_iter()
        .map(|kind| Ok((kind, hook_state(vcs, kind)?)))
        .collect::<Result<Vec<_>>>()?;
    let excludes_configured = ignore::read_block(&vcs.git_path("info/exclude")?)?.is_some();

    Ok(StatusReport {
        branch,
        classification: check.classification,
        hooks,
        excludes_configured,
        staged_files: vcs.staged_paths()?,
        private_files_staged: check.violations,
    })
}
