//! Runner configuration

use crate::execution::SchedulingStrategy;
use std::path::PathBuf;

/// Host variables copied into every job environment by default
pub const DEFAULT_PASSTHROUGH_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LC_ALL",
    "TERM",
    "TMPDIR",
    "CARGO_HOME",
    "RUSTUP_HOME",
];

/// Runner labels accepted when none are configured
pub const DEFAULT_LABELS: &[&str] = &["ubuntu-latest", "self-hosted", "local"];

/// Coloring requested for tool diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Leave the decision to each tool
    #[default]
    Auto,
    Always,
    Never,
}

/// Diagnostics settings handed to every step
///
/// These only change how tools render their output, never whether a step passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics {
    pub color: ColorChoice,
}

impl Diagnostics {
    pub fn new(color: ColorChoice) -> Self {
        Self { color }
    }

    /// Environment variables that carry the color choice to child tools
    pub fn env_vars(&self) -> &'static [(&'static str, &'static str)] {
        match self.color {
            ColorChoice::Auto => &[],
            ColorChoice::Always => &[("CARGO_TERM_COLOR", "always"), ("CLICOLOR_FORCE", "1")],
            ColorChoice::Never => &[("CARGO_TERM_COLOR", "never"), ("NO_COLOR", "1")],
        }
    }
}

/// Settings for the local runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory job workspaces are created under
    pub workspace_root: PathBuf,

    /// `runs-on` labels this runner serves (`*` serves all)
    pub labels: Vec<String>,

    /// Host environment variables passed through to jobs
    pub passthrough_env: Vec<String>,

    pub strategy: SchedulingStrategy,

    pub diagnostics: Diagnostics,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir(),
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            passthrough_env: DEFAULT_PASSTHROUGH_ENV.iter().map(|v| v.to_string()).collect(),
            strategy: SchedulingStrategy::default(),
            diagnostics: Diagnostics::default(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Whether this runner can host a job asking for `label`
    pub fn serves(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == "*" || l == label)
    }
}
