//! # repoguard
//!
//! Keeps private content out of public git branches.
//!
//! ## Features
//!
//! - Pre-commit guard that rejects private paths on public branches
//! - Derivation of clean public branches from a private branch
//! - Merges that strip private content when crossing to a public branch
//! - Squash-or-preserve merging of development branches with sanitized messages
//! - History rewriting through `git filter-repo`
//!
//! ## Quick Start
//!
//! ```rust
//! use repoguard::config::Policy;
//! use repoguard::guard::CommitGuard;
//!
//! let policy = Policy::defaults().unwrap();
//! let check = CommitGuard::new(&policy).validate("main", &["src/lib.rs", "CLAUDE.md"]);
//! assert_eq!(check.violations.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod branch;
pub mod checkout;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod git;
pub mod guard;
pub mod history;
pub mod ignore;
pub mod merge;
pub mod partition;
pub mod rules;
pub mod utils;

pub use crate::cli::Cli;
pub use crate::error::{GuardError, Result};

/// The current version of repoguard.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
