//! Job scheduler - determines which jobs to launch next

use crate::core::{JobStatus, WorkflowDefinition};
use std::collections::{HashMap, HashSet};

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One job at a time, in dependency then declaration order
    Sequential,

    /// Launch every ready job at once
    #[default]
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

/// What has happened so far in one run
#[derive(Debug, Default)]
pub struct RunProgress {
    running: HashSet<String>,
    finished: HashMap<String, JobStatus>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_running(&mut self, job_id: &str) {
        self.running.insert(job_id.to_string());
    }

    pub fn mark_finished(&mut self, job_id: &str, status: JobStatus) {
        self.running.remove(job_id);
        self.finished.insert(job_id.to_string(), status);
    }

    /// Started or finished
    pub fn is_started(&self, job_id: &str) -> bool {
        self.running.contains(job_id) || self.finished.contains_key(job_id)
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.finished.get(job_id).copied()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

/// Scheduler for determining which jobs to run
#[derive(Debug, Clone, Copy, Default)]
pub struct JobScheduler {
    strategy: SchedulingStrategy,
}

impl JobScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    /// Jobs to launch now: not started, every dependency succeeded
    pub fn next_jobs(&self, workflow: &WorkflowDefinition, progress: &RunProgress) -> Vec<String> {
        let slots = match self.strategy {
            SchedulingStrategy::Sequential => 1usize.saturating_sub(progress.running_count()),
            SchedulingStrategy::Parallel => usize::MAX,
            SchedulingStrategy::LimitedParallel(max) => {
                max.max(1).saturating_sub(progress.running_count())
            }
        };

        if slots == 0 {
            return vec![];
        }

        workflow
            .execution_order()
            .into_iter()
            .filter(|id| !progress.is_started(id))
            .filter(|id| {
                workflow.job(id).is_some_and(|job| {
                    job.needs
                        .iter()
                        .all(|dep| progress.status(dep) == Some(JobStatus::Success))
                })
            })
            .take(slots)
            .collect()
    }

    /// Jobs that can never run because a dependency finished without success
    ///
    /// Returns `(job, dependency)` pairs.
    pub fn blocked_jobs(
        &self,
        workflow: &WorkflowDefinition,
        progress: &RunProgress,
    ) -> Vec<(String, String)> {
        workflow
            .jobs
            .iter()
            .filter(|job| !progress.is_started(&job.id))
            .filter_map(|job| {
                job.needs
                    .iter()
                    .find(|dep| {
                        matches!(
                            progress.status(dep),
                            Some(JobStatus::Failure | JobStatus::Skipped)
                        )
                    })
                    .map(|dep| (job.id.clone(), dep.clone()))
            })
            .collect()
    }
}
