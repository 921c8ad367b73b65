//! Branch classification.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a branch may carry private content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Private workspace branch; accepts any content.
    Private,
    /// Public-facing branch; must never track sensitive paths.
    Public,
    /// Not configured anywhere. Treated exactly like [`Classification::Public`].
    Unknown,
}

impl Classification {
    /// Whether the branch must be kept free of private content.
    pub fn is_public(self) -> bool {
        !matches!(self, Self::Private)
    }

    /// Lowercase label for reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Unknown => "unknown (treated as public)",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies branch names using configured name sets and prefixes.
#[derive(Debug, Clone)]
pub struct BranchClassifier {
    private: BTreeSet<String>,
    public: BTreeSet<String>,
    private_prefixes: Vec<String>,
}

impl BranchClassifier {
    /// Builds a classifier; all comparisons are case-insensitive.
    pub fn new<S: AsRef<str>>(private: &[S], public: &[S], private_prefixes: &[S]) -> Self {
        let lower = |items: &[S]| -> Vec<String> {
            items
                .iter()
                .map(|item| item.as_ref().trim().to_lowercase())
                .filter(|item| !item.is_empty())
                .collect()
        };
        Self {
            private: lower(private).into_iter().collect(),
            public: lower(public).into_iter().collect(),
            private_prefixes: lower(private_prefixes),
        }
    }

    /// Classifies `name`.
    ///
    /// Exact private names win over exact public names, which win over
    /// private prefixes. Anything unmatched is [`Classification::Unknown`].
    pub fn classify(&self, name: &str) -> Classification {
        let name = name.trim().to_lowercase();
        if self.private.contains(&name) {
            Classification::Private
        } else if self.public.contains(&name) {
            Classification::Public
        } else if self
            .private_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
        {
            Classification::Private
        } else {
            Classification::Unknown
        }
    }

    /// Convenience wrapper for `classify(name).is_public()`.
    pub fn is_public(&self, name: &str) -> bool {
        self.classify(name).is_public()
    }
}

impl Default for BranchClassifier {
    fn default() -> Self {
        let defaults = crate::config::GuardConfig::default();
        Self::new(
            &defaults.private_branches,
            &defaults.public_branches,
            &defaults.private_branch_prefixes,
        )
    }
}
