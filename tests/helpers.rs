//! Test utility functions for cirun
#![allow(dead_code)]

use async_trait::async_trait;
use cirun::core::config::WorkflowConfig;
use cirun::execution::{RunnerConfig, WorkflowEngine};
use cirun::shell::{CommandError, CommandOutput, CommandRunner, Invocation, Termination};
use cirun::{Event, JobStatus, RunResult, SourceSnapshot, WorkflowDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// One command seen by the mock runner
#[derive(Debug, Clone)]
pub struct Call {
    pub job: String,
    pub script: String,
}

#[derive(Debug, Clone)]
struct Outcome {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Shared view of what a [`ScriptedRunner`] did, usable after the runner moved into an engine
#[derive(Clone, Default)]
pub struct RunnerLog {
    calls: Arc<Mutex<Vec<Call>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl RunnerLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn scripts_for(&self, job: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.job == job)
            .map(|c| c.script)
            .collect()
    }

    /// Highest number of commands that were running at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Mock command runner: every script succeeds unless told otherwise
#[derive(Default)]
pub struct ScriptedRunner {
    outcomes: HashMap<String, Outcome>,
    delay: Option<Duration>,
    log: RunnerLog,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `script` exit with `exit_code`, printing `stdout`
    pub fn fail(mut self, script: &str, exit_code: i32, stdout: &str) -> Self {
        self.outcomes.insert(
            script.to_string(),
            Outcome {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    /// Every command takes this long (and can be cancelled meanwhile)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn log(&self) -> RunnerLog {
        self.log.clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, CommandError> {
        let script = invocation.args.last().cloned().unwrap_or_default();
        let job = invocation.env.get("CIRUN_JOB").cloned().unwrap_or_default();
        self.log.calls.lock().unwrap().push(Call {
            job,
            script: script.clone(),
        });

        let now_active = self.log.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_active.fetch_max(now_active, Ordering::SeqCst);

        let mut termination = None;
        if let Some(delay) = self.delay {
            let limit = timeout.unwrap_or(Duration::MAX);
            tokio::select! {
                _ = tokio::time::sleep(delay.min(limit)) => {
                    if limit < delay {
                        termination = Some(Termination::TimedOut(limit));
                    }
                }
                _ = cancel.cancelled() => termination = Some(Termination::Cancelled),
            }
        }

        self.log.active.fetch_sub(1, Ordering::SeqCst);

        let outcome = self.outcomes.get(&script).cloned().unwrap_or(Outcome {
            exit_code: 0,
            stdout: format!("ran {}\n", script),
            stderr: String::new(),
        });

        Ok(CommandOutput {
            termination: termination.unwrap_or(Termination::Exited(outcome.exit_code)),
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            duration: self.delay.unwrap_or_default(),
        })
    }
}

/// The workflow shipped with this repository
pub fn ci_workflow() -> WorkflowDefinition {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".github/workflows/ci.yml");
    WorkflowConfig::from_file(path)
        .unwrap()
        .to_definition()
        .unwrap()
}

pub fn workflow_from_yaml(yaml: &str) -> WorkflowDefinition {
    WorkflowConfig::from_yaml(yaml)
        .unwrap()
        .to_definition()
        .unwrap()
}

/// A small source tree to check out
pub fn source_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("Cargo.toml"),
        "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "pub fn demo() {}\n").unwrap();
    dir
}

pub fn pull_request(branch: &str, source: &Path) -> Event {
    Event::pull_request(branch, SourceSnapshot::new(source).with_revision("0123abc"))
}

/// Runner config with workspaces under `root`
pub fn runner_config(root: &Path) -> RunnerConfig {
    RunnerConfig::new().with_workspace_root(root)
}

pub fn engine<R: CommandRunner + 'static>(runner: R, config: RunnerConfig) -> WorkflowEngine<R> {
    WorkflowEngine::new(runner, config)
}

/// Job id → status, for comparing runs
pub fn job_statuses(run: &RunResult) -> HashMap<String, JobStatus> {
    run.jobs
        .iter()
        .map(|job| (job.job_id.clone(), job.status))
        .collect()
}

/// Assert that a job finished with the given status
pub fn assert_job_status(run: &RunResult, job_id: &str, expected: JobStatus) {
    let job = run
        .job(job_id)
        .unwrap_or_else(|| panic!("Job '{}' missing from run", job_id));
    assert_eq!(
        job.status, expected,
        "Job '{}' expected {:?}, got {:?} ({:?})",
        job_id, expected, job.status, job.failure
    );
}

/// Assert the names of the steps a job recorded, in order
pub fn assert_steps_recorded(run: &RunResult, job_id: &str, expected: &[&str]) {
    let job = run
        .job(job_id)
        .unwrap_or_else(|| panic!("Job '{}' missing from run", job_id));
    let names: Vec<&str> = job.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, expected, "Steps recorded for job '{}'", job_id);
}

/// Assert that a workspace directory was cleaned up
pub fn assert_removed(path: &Path) {
    assert!(
        !path.exists(),
        "Workspace {} should have been removed",
        path.display()
    );
}

/// Workspace directories currently left under `root`
pub fn leftover_workspaces(root: &Path) -> Vec<String> {
    std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with("cirun-"))
                .collect()
        })
        .unwrap_or_default()
}
