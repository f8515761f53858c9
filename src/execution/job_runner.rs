//! Job runner - runs one job's steps in its own environment

use crate::core::{
    BuiltinAction, Event, Job, JobFailure, JobResult, StepAction, StepResult, StepStatus,
    WorkflowDefinition,
};
use crate::execution::{
    EventEmitter, ExecutionEvent, JobEnvironment, RunnerConfig, StepExecutor,
};
use crate::shell::CommandRunner;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs a single job from environment setup to teardown
pub struct JobRunner<R> {
    executor: StepExecutor<R>,
    config: Arc<RunnerConfig>,
    events: EventEmitter,
}

impl<R: CommandRunner> JobRunner<R> {
    pub fn new(runner: Arc<R>, config: Arc<RunnerConfig>) -> Self {
        Self {
            executor: StepExecutor::new(runner, config.diagnostics),
            config,
            events: EventEmitter::new(),
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Run a job and produce its result
    ///
    /// Never fails: every problem ends up in the returned [`JobResult`].
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        job: &Job,
        event: &Event,
        cancel: &CancellationToken,
    ) -> JobResult {
        let started_at = Utc::now();

        if cancel.is_cancelled() {
            info!(job = %job.id, "run cancelled before job started");
            return JobResult::failure(&job.id, JobFailure::Cancelled, Vec::new(), started_at);
        }

        info!(job = %job.id, runs_on = %job.runs_on, "starting job");

        let env = match JobEnvironment::provision(workflow, job, event, &self.config) {
            Ok(env) => env,
            Err(e) => {
                error!(job = %job.id, "environment setup failed: {}", e);
                return JobResult::failure(
                    &job.id,
                    JobFailure::EnvironmentSetup {
                        reason: e.to_string(),
                    },
                    Vec::new(),
                    started_at,
                );
            }
        };

        let outcome = self.run_steps(job, &env, event, cancel).await;

        if let Err(e) = env.teardown() {
            warn!(job = %job.id, "failed to remove workspace: {}", e);
        }

        match outcome {
            Ok(steps) => {
                info!(job = %job.id, steps = steps.len(), "job succeeded");
                JobResult::success(&job.id, steps, started_at)
            }
            Err((failure, steps)) => {
                warn!(job = %job.id, "job failed: {}", failure);
                JobResult::failure(&job.id, failure, steps, started_at)
            }
        }
    }

    /// Run steps in order, stopping at the first one that does not succeed
    async fn run_steps(
        &self,
        job: &Job,
        env: &JobEnvironment,
        event: &Event,
        cancel: &CancellationToken,
    ) -> Result<Vec<StepResult>, (JobFailure, Vec<StepResult>)> {
        let job_started = Instant::now();
        let mut results = Vec::with_capacity(job.steps.len());

        for step in &job.steps {
            if cancel.is_cancelled() {
                info!(job = %job.id, step = %step.name, "cancelled before step");
                return Err((JobFailure::Cancelled, results));
            }

            self.events.emit(ExecutionEvent::StepStarted {
                job_id: job.id.clone(),
                step: step.name.clone(),
            });

            let result = match &step.action {
                StepAction::Uses(BuiltinAction::Checkout { path }) => {
                    let started_at = Utc::now();
                    match env.checkout(&event.source, path.as_deref()).await {
                        Ok(files) => StepResult {
                            name: step.name.clone(),
                            status: StepStatus::Succeeded,
                            stdout: format!(
                                "Checked out {} files from {}\n",
                                files,
                                event.source.root.display()
                            ),
                            stderr: String::new(),
                            started_at,
                            finished_at: Utc::now(),
                        },
                        Err(e) => {
                            error!(job = %job.id, step = %step.name, "checkout failed: {}", e);
                            self.events.emit(ExecutionEvent::StepFinished {
                                job_id: job.id.clone(),
                                step: step.name.clone(),
                                status: StepStatus::Failed { exit_code: None },
                            });
                            // A broken checkout leaves nothing worth reporting
                            return Err((
                                JobFailure::EnvironmentSetup {
                                    reason: e.to_string(),
                                },
                                Vec::new(),
                            ));
                        }
                    }
                }
                StepAction::Run { .. } => {
                    let remaining = job
                        .timeout
                        .map(|limit| limit.saturating_sub(job_started.elapsed()));
                    let limit = effective_limit(step.timeout, remaining);
                    self.executor.run(step, env, limit, cancel).await
                }
            };

            self.events.emit(ExecutionEvent::StepFinished {
                job_id: job.id.clone(),
                step: step.name.clone(),
                status: result.status.clone(),
            });

            let failure = match &result.status {
                StepStatus::Succeeded => None,
                StepStatus::Failed { .. } => Some(JobFailure::StepFailed {
                    step: step.name.clone(),
                }),
                StepStatus::TimedOut { .. } => Some(JobFailure::StepTimedOut {
                    step: step.name.clone(),
                }),
                StepStatus::Cancelled => Some(JobFailure::Cancelled),
            };

            results.push(result);

            if let Some(failure) = failure {
                return Err((failure, results));
            }
        }

        Ok(results)
    }
}

/// The step's own limit or what is left of the job's, whichever is smaller
fn effective_limit(step: Option<Duration>, job_remaining: Option<Duration>) -> Option<Duration> {
    match (step, job_remaining) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
