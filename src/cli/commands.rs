//! CLI command definitions

use crate::core::{Event, EventKind, SourceSnapshot};
use crate::execution::{ColorChoice, SchedulingStrategy};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Default location of the workflow file
pub const DEFAULT_WORKFLOW: &str = ".github/workflows/ci.yml";

/// Describes the triggering event, either inline or from a JSON file
#[derive(Debug, Args, Clone)]
pub struct EventArgs {
    /// Event kind (pull_request, push, workflow_dispatch)
    #[arg(long, default_value = "pull_request")]
    pub event: String,

    /// Branch the change targets
    #[arg(long, default_value = "main", env = "CIRUN_BRANCH")]
    pub branch: String,

    /// Directory holding the source snapshot
    #[arg(long, default_value = ".")]
    pub source: PathBuf,

    /// Commit the snapshot corresponds to
    #[arg(long, env = "CIRUN_SHA")]
    pub revision: Option<String>,

    /// Top-level entries never copied by checkout
    #[arg(long, value_delimiter = ',', default_value = ".git,target")]
    pub exclude: Vec<String>,

    /// Read the event from a JSON file instead
    #[arg(long, conflicts_with_all = ["event", "branch", "revision"])]
    pub event_file: Option<PathBuf>,
}

impl EventArgs {
    pub fn to_event(&self) -> Result<Event> {
        if let Some(path) = &self.event_file {
            return Event::from_json_file(path)
                .with_context(|| format!("Failed to read event file {}", path.display()));
        }

        let mut source = SourceSnapshot::new(&self.source).with_exclude(self.exclude.clone());
        if let Some(revision) = &self.revision {
            source = source.with_revision(revision.clone());
        }
        Ok(Event::new(EventKind::parse(&self.event), &self.branch, source))
    }
}

/// Run a workflow for an event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file
    #[arg(short, long, default_value = DEFAULT_WORKFLOW, env = "CIRUN_WORKFLOW")]
    pub file: PathBuf,

    #[command(flatten)]
    pub event: EventArgs,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Maximum concurrent jobs for `parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Directory job workspaces are created in
    #[arg(long, env = "CIRUN_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Runner labels this machine serves (`*` for any)
    #[arg(long = "label", value_delimiter = ',', env = "CIRUN_LABELS")]
    pub labels: Vec<String>,

    /// Extra host environment variables passed to jobs
    #[arg(long = "pass-env", value_delimiter = ',')]
    pub pass_env: Vec<String>,

    /// Print the run result as JSON
    #[arg(long)]
    pub json: bool,

    /// Lines of output shown for a failing step
    #[arg(long, default_value_t = 20)]
    pub tail: usize,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a workflow configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long, default_value = DEFAULT_WORKFLOW, env = "CIRUN_WORKFLOW")]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Check whether an event would trigger a workflow, without running it
#[derive(Debug, Args, Clone)]
pub struct CheckCommand {
    /// Path to workflow YAML file
    #[arg(short, long, default_value = DEFAULT_WORKFLOW, env = "CIRUN_WORKFLOW")]
    pub file: PathBuf,

    #[command(flatten)]
    pub event: EventArgs,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl SchedulingStrategyArg {
    pub fn to_strategy(self, max_parallel: usize) -> SchedulingStrategy {
        match self {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(max_parallel.max(1))
            }
        }
    }
}

/// Color argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => ColorChoice::Auto,
            ColorArg::Always => ColorChoice::Always,
            ColorArg::Never => ColorChoice::Never,
        }
    }
}
