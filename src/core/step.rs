//! Step domain model

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A single step in a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Display name (defaults to the command or action reference)
    pub name: String,

    /// What the step does
    pub action: StepAction,

    /// Step-level environment variables (override job and workflow env)
    pub env: BTreeMap<String, String>,

    /// Directory relative to the workspace to run in
    pub working_directory: Option<PathBuf>,

    /// Time limit for this step alone
    pub timeout: Option<Duration>,
}

/// Resolved step behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Inline shell command
    Run { script: String, shell: ShellKind },
    /// Reference to a reusable action the runner implements itself
    Uses(BuiltinAction),
}

/// Actions the runner knows how to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinAction {
    /// Materialize the event's source snapshot into the workspace
    Checkout {
        /// Destination relative to the workspace (None = workspace root)
        path: Option<PathBuf>,
    },
}

/// Shell used for `run` steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellKind {
    /// POSIX `sh`, exit on first error
    #[default]
    Sh,
    /// `bash` with `-eo pipefail`
    Bash,
}

impl ShellKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sh" => Some(ShellKind::Sh),
            "bash" => Some(ShellKind::Bash),
            _ => None,
        }
    }

    /// Program and leading arguments; the script is appended as the last argument
    pub fn command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            ShellKind::Sh => ("sh", &["-e", "-c"]),
            ShellKind::Bash => ("bash", &["--noprofile", "--norc", "-eo", "pipefail", "-c"]),
        }
    }
}

/// A parsed `uses:` reference such as `actions/checkout@v4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub owner: String,
    pub repo: String,
    pub version: Option<String>,
}

impl ActionRef {
    pub fn parse(reference: &str) -> Option<Self> {
        let (path, version) = match reference.trim().split_once('@') {
            Some((path, version)) if !version.is_empty() => (path, Some(version.to_string())),
            Some(_) => return None,
            None => (reference.trim(), None),
        };

        let (owner, repo) = path.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            version,
        })
    }

    pub fn is_checkout(&self) -> bool {
        self.owner == "actions" && self.repo == "checkout"
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

impl Step {
    /// Step running an inline command with the default shell
    pub fn run(name: &str, script: &str) -> Self {
        Self {
            name: name.to_string(),
            action: StepAction::Run {
                script: script.to_string(),
                shell: ShellKind::default(),
            },
            env: BTreeMap::new(),
            working_directory: None,
            timeout: None,
        }
    }

    /// Checkout step into the workspace root
    pub fn checkout(name: &str) -> Self {
        Self {
            name: name.to_string(),
            action: StepAction::Uses(BuiltinAction::Checkout { path: None }),
            env: BTreeMap::new(),
            working_directory: None,
            timeout: None,
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_checkout(&self) -> bool {
        matches!(self.action, StepAction::Uses(BuiltinAction::Checkout { .. }))
    }
}
