//! Utility functions and helpers.

pub mod preflight;
pub mod prompt;

pub use preflight::{
    check_branch_exists, check_git_repository, check_not_checked_out_elsewhere, check_on_branch,
    check_working_directory_clean,
};
pub use prompt::{confirm, Prompter, TerminalPrompter};
