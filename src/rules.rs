//! Path sensitivity rules and the matcher that evaluates them.
//!
//! A [`RuleSet`] is an unordered collection of [`Rule`]s. Rules are kept in
//! their canonical order internally, so neither the verdict nor the reported
//! reason depends on the order a rule set was written in.

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// A single path rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    /// Matches one repository-relative path exactly.
    Exact(String),
    /// Matches a directory and everything below it, on a `/` boundary.
    #[serde(rename = "prefix")]
    DirectoryPrefix(String),
    /// Shell glob with `*` and `**`; a pattern without `/` also tests the file name.
    Glob(String),
    /// Matches any path containing the marker.
    Substring(String),
}

impl Rule {
    /// Interprets a plain configuration string.
    ///
    /// A trailing `/` makes a directory rule, glob metacharacters make a glob,
    /// anything else is an exact path.
    pub fn parse(text: &str) -> Self {
        let text = text.trim().trim_start_matches("./");
        if let Some(dir) = text.strip_suffix('/') {
            Self::DirectoryPrefix(dir.to_string())
        } else if text.contains(['*', '?', '[']) {
            Self::Glob(text.to_string())
        } else {
            Self::Exact(text.to_string())
        }
    }

    /// Short human-readable description used as a verdict reason.
    pub fn describe(&self) -> String {
        match self {
            Self::Exact(value) => format!("exact path `{value}`"),
            Self::DirectoryPrefix(dir) => format!("directory `{}/`", dir.trim_end_matches('/')),
            Self::Glob(pattern) => format!("glob `{pattern}`"),
            Self::Substring(marker) => format!("marker `{marker}`"),
        }
    }

    /// The equivalent line for a gitignore-style file.
    pub fn ignore_pattern(&self) -> String {
        match self {
            Self::Exact(value) => format!("/{value}"),
            Self::DirectoryPrefix(dir) => format!("/{}/", dir.trim_end_matches('/')),
            Self::Glob(pattern) => pattern.clone(),
            Self::Substring(marker) => format!("*{marker}*"),
        }
    }

    /// The bare value of the rule.
    pub fn value(&self) -> &str {
        match self {
            Self::Exact(v) | Self::DirectoryPrefix(v) | Self::Glob(v) | Self::Substring(v) => v,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A rule as written in configuration: a plain string or an explicitly tagged rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    /// Plain string, classified by [`Rule::parse`].
    Pattern(String),
    /// `{exact: ..}`, `{prefix: ..}`, `{glob: ..}` or `{substring: ..}`.
    Tagged(Rule),
}

impl RuleEntry {
    /// Resolves the entry into a concrete rule.
    pub fn to_rule(&self) -> Rule {
        match self {
            Self::Pattern(text) => Rule::parse(text),
            Self::Tagged(rule) => rule.clone(),
        }
    }
}

impl From<&str> for RuleEntry {
    fn from(text: &str) -> Self {
        Self::Pattern(text.to_string())
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: Rule,
    glob: Option<GlobMatcher>,
    match_file_name: bool,
}

impl CompiledRule {
    fn compile(set: &str, rule: Rule) -> Result<Self> {
        if rule.value().trim_end_matches('/').is_empty() {
            return Err(GuardError::config(set, format!("empty rule value in {rule:?}")));
        }
        let (glob, match_file_name) = match &rule {
            Rule::Glob(pattern) => {
                let matcher = GlobBuilder::new(pattern)
                    .literal_separator(false)
                    .build()
                    .map_err(|e| GuardError::config(set, format!("bad glob `{pattern}`: {e}")))?
                    .compile_matcher();
                (Some(matcher), !pattern.contains('/'))
            }
            _ => (None, false),
        };
        Ok(Self {
            rule,
            glob,
            match_file_name,
        })
    }

    fn matches(&self, path: &str) -> bool {
        match &self.rule {
            Rule::Exact(value) => path == value,
            Rule::DirectoryPrefix(dir) => {
                let dir = dir.trim_end_matches('/');
                path.strip_prefix(dir)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            }
            Rule::Glob(_) => self.glob.as_ref().is_some_and(|glob| {
                glob.is_match(path)
                    || (self.match_file_name
                        && path
                            .rsplit_once('/')
                            .is_some_and(|(_, name)| glob.is_match(name)))
            }),
            Rule::Substring(marker) => path.contains(marker.as_str()),
        }
    }
}

/// A named, compiled collection of rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles `rules`, rejecting malformed globs and empty values.
    pub fn new(name: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Result<Self> {
        let name = name.into();
        let mut sorted: Vec<Rule> = rules.into_iter().collect();
        sorted.sort();
        sorted.dedup();
        let rules = sorted
            .into_iter()
            .map(|rule| CompiledRule::compile(&name, rule))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, rules })
    }

    /// Compiles configuration entries.
    pub fn from_entries(name: impl Into<String>, entries: &[RuleEntry]) -> Result<Self> {
        Self::new(name, entries.iter().map(RuleEntry::to_rule))
    }

    /// An empty rule set that matches nothing.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rules in canonical order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    /// Number of distinct rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The canonically first rule matching `path`.
    pub fn first_match(&self, path: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|compiled| compiled.matches(path))
            .map(|compiled| &compiled.rule)
    }
}

/// A path found sensitive, with the rule that matched it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensitivityVerdict {
    /// Repository-relative path.
    pub path: String,
    /// Description of the matched rule.
    pub reason: String,
}

impl SensitivityVerdict {
    /// Creates a verdict.
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SensitivityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.reason)
    }
}

/// Evaluates paths against the union of several rule sets.
#[derive(Debug, Clone, Default)]
pub struct ContentSensitivityMatcher<'a> {
    sets: Vec<&'a RuleSet>,
}

impl<'a> ContentSensitivityMatcher<'a> {
    /// Creates a matcher over the union of `sets`.
    pub fn new(sets: impl IntoIterator<Item = &'a RuleSet>) -> Self {
        Self {
            sets: sets.into_iter().collect(),
        }
    }

    /// Returns the matching rule for `path`, if any rule in any set matches.
    pub fn matching_rule(&self, path: &str) -> Option<&'a Rule> {
        self.sets
            .iter()
            .copied()
            .filter_map(|set| set.first_match(path))
            .min()
    }

    /// Returns a verdict when `path` is sensitive.
    pub fn is_sensitive(&self, path: &str) -> Option<SensitivityVerdict> {
        self.matching_rule(path)
            .map(|rule| SensitivityVerdict::new(path, rule.describe()))
    }

    /// Verdicts for every sensitive path in `paths`, sorted by path.
    pub fn scan<I, S>(&self, paths: I) -> Vec<SensitivityVerdict>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut verdicts: Vec<SensitivityVerdict> = paths
            .into_iter()
            .filter_map(|path| self.is_sensitive(path.as_ref()))
            .collect();
        verdicts.sort();
        verdicts.dedup();
        verdicts
    }
}
