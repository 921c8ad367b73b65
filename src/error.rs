//! Error type shared by the partitioning and protection engine.

use std::fmt::Write as _;
use std::path::PathBuf;

use thiserror::Error;

use crate::rules::SensitivityVerdict;

/// Result alias used across the library.
pub type Result<T, E = GuardError> = std::result::Result<T, E>;

/// Errors raised by repoguard operations.
#[derive(Error, Debug)]
pub enum GuardError {
    /// A rule set, branch rule or message pattern could not be compiled.
    #[error("invalid configuration in `{field}`: {detail}")]
    Configuration {
        /// Configuration field holding the bad entry.
        field: String,
        /// What was wrong with it.
        detail: String,
    },

    /// The path is not inside a git working tree.
    #[error("not a git repository (or bare repository): {}", .0.display())]
    NotVersionControlled(PathBuf),

    /// A required external program is missing or not runnable.
    #[error("`{tool}` is not available: {hint}")]
    ExternalToolUnavailable {
        /// Program that could not be run.
        tool: String,
        /// How to install or enable it.
        hint: String,
    },

    /// A git subprocess exited unsuccessfully.
    #[error("`{command}` failed{}: {}", exit_suffix(.status), .stderr.trim())]
    VcsCommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit status, if the process exited normally.
        status: Option<i32>,
        /// Captured standard error (or output when stderr was empty).
        stderr: String,
    },

    /// A partitioned branch still tracks sensitive paths.
    #[error("verification failed: branch `{branch}` still tracks private content:\n{}", list_verdicts(.violations))]
    VerificationFailed {
        /// Branch that failed verification.
        branch: String,
        /// Every offending path with the rule it matched.
        violations: Vec<SensitivityVerdict>,
    },

    /// Staged content would publish private paths.
    #[error("commit blocked on branch `{branch}`:\n{}", list_verdicts(.violations))]
    CommitBlocked {
        /// Branch the commit targets.
        branch: String,
        /// Every offending path with the rule it matched.
        violations: Vec<SensitivityVerdict>,
    },

    /// A destructive step was refused or declined.
    #[error("operation aborted: {0}")]
    UnsafeOperationAborted(String),

    /// The requested behaviour is reserved but has no implementation.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// libgit2 failure while reading repository state.
    #[error(transparent)]
    Git(#[from] git2::Error),
}

impl GuardError {
    /// Builds a configuration error for `field`.
    pub fn config(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Returns the verdicts carried by this error, if any.
    pub fn violations(&self) -> &[SensitivityVerdict] {
        match self {
            Self::VerificationFailed { violations, .. } | Self::CommitBlocked { violations, .. } => {
                violations
            }
            _ => &[],
        }
    }
}

fn exit_suffix(status: &Option<i32>) -> String {
    status.map_or_else(
        || " (terminated by signal)".to_string(),
        |code| format!(" with exit status {code}"),
    )
}

fn list_verdicts(violations: &[SensitivityVerdict]) -> String {
    let mut out = String::new();
    for verdict in violations {
        let _ = writeln!(out, "  - {} ({})", verdict.path, verdict.reason);
    }
    out.trim_end().to_string()
}
