//! Execution state and result models

use crate::core::event::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Terminal status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Every step succeeded
    Success,
    /// A step failed, timed out, was cancelled, or the environment could not be set up
    Failure,
    /// Never ran because a dependency did not succeed
    Skipped,
}

/// Overall status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failure,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Exited with status zero
    Succeeded,
    /// Non-zero exit, killed by a signal (`exit_code: None`) or could not be spawned
    Failed { exit_code: Option<i32> },
    /// Exceeded its time limit and was killed
    TimedOut { limit: Duration },
    /// Killed because the run was cancelled
    Cancelled,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded)
    }
}

/// Captured result of one step. Kept even when the step failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the step failed by running out of time rather than by exiting
    pub fn timed_out(&self) -> bool {
        matches!(self.status, StepStatus::TimedOut { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            StepStatus::Succeeded => Some(0),
            StepStatus::Failed { exit_code } => exit_code,
            _ => None,
        }
    }

    /// Combined stdout and stderr, for diagnostics
    pub fn output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Why a job did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobFailure {
    /// A step exited non-zero or could not be started
    StepFailed { step: String },
    /// A step ran past its time limit
    StepTimedOut { step: String },
    /// The isolated environment could not be provisioned (includes checkout)
    EnvironmentSetup { reason: String },
    /// The run was cancelled before or while the job ran
    Cancelled,
    /// The job task ended without producing a result
    Aborted { reason: String },
    /// A job in `needs` did not succeed
    DependencyFailed { job: String },
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::StepFailed { step } => write!(f, "step '{}' failed", step),
            JobFailure::StepTimedOut { step } => write!(f, "step '{}' timed out", step),
            JobFailure::EnvironmentSetup { reason } => {
                write!(f, "environment setup failed: {}", reason)
            }
            JobFailure::Cancelled => f.write_str("cancelled"),
            JobFailure::Aborted { reason } => write!(f, "aborted: {}", reason),
            JobFailure::DependencyFailed { job } => write!(f, "dependency '{}' did not succeed", job),
        }
    }
}

/// Result of running one job. Built once by the job runner, never mutated after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub failure: Option<JobFailure>,
    pub steps: Vec<StepResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn success(job_id: &str, steps: Vec<StepResult>, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Success,
            failure: None,
            steps,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(
        job_id: &str,
        failure: JobFailure,
        steps: Vec<StepResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Failure,
            failure: Some(failure),
            steps,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(job_id: &str, dependency: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Skipped,
            failure: Some(JobFailure::DependencyFailed {
                job: dependency.to_string(),
            }),
            steps: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Aggregate of all job results for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub workflow: String,
    pub event: Event,
    pub status: RunStatus,
    pub jobs: Vec<JobResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Aggregate job results: Failure if any job failed, else Success
    pub fn aggregate(
        run_id: Uuid,
        workflow: &str,
        event: Event,
        jobs: Vec<JobResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let status = Self::status_of(&jobs);
        Self {
            run_id,
            workflow: workflow.to_string(),
            event,
            status,
            jobs,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn status_of(jobs: &[JobResult]) -> RunStatus {
        if jobs.iter().any(|job| job.status == JobStatus::Failure) {
            RunStatus::Failure
        } else {
            RunStatus::Success
        }
    }

    pub fn job(&self, job_id: &str) -> Option<&JobResult> {
        self.jobs.iter().find(|job| job.job_id == job_id)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }
}
