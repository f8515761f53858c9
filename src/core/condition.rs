//! Activation condition model

use crate::core::event::{normalize_branch, EventKind};
use regex::Regex;

/// Pattern a target branch is matched against
#[derive(Debug, Clone)]
pub enum BranchPattern {
    /// Literal branch name
    Exact(String),
    /// Glob compiled to an anchored regular expression
    Glob { source: String, regex: Regex },
}

impl BranchPattern {
    /// Compile a branch pattern. Patterns without glob metacharacters stay exact.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let pattern = normalize_branch(pattern);
        if !pattern.contains(|c: char| c == '*' || c == '?') {
            return Ok(BranchPattern::Exact(pattern));
        }

        let regex = Regex::new(&glob_to_regex(&pattern))?;
        Ok(BranchPattern::Glob {
            source: pattern,
            regex,
        })
    }

    /// Check if the pattern matches the given branch name
    pub fn matches(&self, branch: &str) -> bool {
        match self {
            BranchPattern::Exact(name) => name == branch,
            BranchPattern::Glob { regex, .. } => regex.is_match(branch),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BranchPattern::Exact(name) => name,
            BranchPattern::Glob { source, .. } => source,
        }
    }
}

/// `*` stays within one path segment, `**` crosses segments, `?` is one character.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

/// Filter for a single accepted event kind
#[derive(Debug, Clone)]
pub struct TriggerRule {
    pub kind: EventKind,

    /// Branches that activate the workflow (empty = any branch)
    pub branches: Vec<BranchPattern>,

    /// Branches that never activate the workflow
    pub branches_ignore: Vec<BranchPattern>,
}

impl TriggerRule {
    pub fn any_branch(kind: EventKind) -> Self {
        Self {
            kind,
            branches: Vec::new(),
            branches_ignore: Vec::new(),
        }
    }

    pub fn accepts_branch(&self, branch: &str) -> bool {
        let included = self.branches.is_empty() || self.branches.iter().any(|p| p.matches(branch));
        included && !self.branches_ignore.iter().any(|p| p.matches(branch))
    }
}

/// Workflow activation condition: the set of accepted triggers
#[derive(Debug, Clone, Default)]
pub struct Condition {
    pub rules: Vec<TriggerRule>,
}

impl Condition {
    pub fn new(rules: Vec<TriggerRule>) -> Self {
        Self { rules }
    }

    /// Rule for the given event kind, if that kind is accepted at all
    pub fn rule_for(&self, kind: &EventKind) -> Option<&TriggerRule> {
        self.rules.iter().find(|rule| &rule.kind == kind)
    }

    pub fn accepted_kinds(&self) -> impl Iterator<Item = &EventKind> {
        self.rules.iter().map(|rule| &rule.kind)
    }
}
