//! Trigger events and the source snapshot they refer to

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of occurrence that may activate a workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    PullRequest,
    Push,
    WorkflowDispatch,
    /// Anything the runner does not know about. Never admitted.
    Other(String),
}

impl EventKind {
    /// Parse an event name as it appears in workflow files (`pull_request`, ...)
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "pull_request" => EventKind::PullRequest,
            "push" => EventKind::Push,
            "workflow_dispatch" => EventKind::WorkflowDispatch,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// Canonical workflow-file name of this kind
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PullRequest => "pull_request",
            EventKind::Push => "push",
            EventKind::WorkflowDispatch => "workflow_dispatch",
            EventKind::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Other(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(EventKind::parse(&name))
    }
}

/// The source tree a run builds against
///
/// Jobs only ever read from `root`; checkout copies it into the job workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    /// Directory holding the source tree
    pub root: PathBuf,

    /// Commit the tree corresponds to, if known
    #[serde(default)]
    pub revision: Option<String>,

    /// Top-level entry names that checkout does not copy
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl SourceSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            revision: None,
            exclude: Vec::new(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }
}

/// An incoming trigger. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,

    /// Branch the change targets, without any `refs/heads/` prefix
    #[serde(deserialize_with = "deserialize_branch")]
    pub target_branch: String,

    pub source: SourceSnapshot,
}

impl Event {
    pub fn new(kind: EventKind, target_branch: &str, source: SourceSnapshot) -> Self {
        Self {
            kind,
            target_branch: normalize_branch(target_branch),
            source,
        }
    }

    pub fn pull_request(target_branch: &str, source: SourceSnapshot) -> Self {
        Self::new(EventKind::PullRequest, target_branch, source)
    }

    /// Load an event descriptor from a JSON file
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse event file {}", path.display()))
    }
}

/// Strip a leading `refs/heads/` so short and full ref names compare equal
pub fn normalize_branch(branch: &str) -> String {
    let branch = branch.trim();
    branch
        .strip_prefix("refs/heads/")
        .unwrap_or(branch)
        .to_string()
}

fn deserialize_branch<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_branch(&raw))
}
