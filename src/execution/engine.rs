//! Main execution engine - orchestrates a whole workflow run

use crate::{
    core::{Event, JobFailure, JobResult, JobStatus, RunResult, WorkflowDefinition},
    execution::{
        EventEmitter, ExecutionEvent, JobRunner, JobScheduler, RunProgress, RunnerConfig,
        TriggerGate,
    },
    shell::CommandRunner,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Main workflow execution engine
pub struct WorkflowEngine<R> {
    commands: Arc<R>,
    config: Arc<RunnerConfig>,
    scheduler: JobScheduler,
    events: EventEmitter,
}

impl<R: CommandRunner + 'static> WorkflowEngine<R> {
    pub fn new(commands: R, config: RunnerConfig) -> Self {
        Self {
            commands: Arc::new(commands),
            scheduler: JobScheduler::new(config.strategy),
            config: Arc::new(config),
            events: EventEmitter::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.add_handler(Arc::new(handler));
    }

    /// Run the workflow if the event activates it
    ///
    /// Returns `None`, without running anything, when the trigger gate rejects the event.
    pub async fn dispatch(&self, workflow: &WorkflowDefinition, event: &Event) -> Option<RunResult> {
        self.dispatch_with_cancel(workflow, event, CancellationToken::new())
            .await
    }

    pub async fn dispatch_with_cancel(
        &self,
        workflow: &WorkflowDefinition,
        event: &Event,
        cancel: CancellationToken,
    ) -> Option<RunResult> {
        if !TriggerGate::admit(event, &workflow.condition) {
            info!(
                workflow = %workflow.name,
                kind = %event.kind,
                branch = %event.target_branch,
                "event does not trigger workflow"
            );
            return None;
        }
        Some(self.run_with_cancel(workflow, event, cancel).await)
    }

    /// Run every job of the workflow for an already admitted event
    pub async fn run(&self, workflow: &WorkflowDefinition, event: &Event) -> RunResult {
        self.run_with_cancel(workflow, event, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        workflow: &WorkflowDefinition,
        event: &Event,
        cancel: CancellationToken,
    ) -> RunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            workflow = %workflow.name,
            %run_id,
            jobs = workflow.jobs.len(),
            "starting workflow run"
        );
        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            workflow: workflow.name.clone(),
        });

        let job_runner = Arc::new(
            JobRunner::new(self.commands.clone(), self.config.clone())
                .with_events(self.events.clone()),
        );
        let shared_workflow = Arc::new(workflow.clone());
        let shared_event = Arc::new(event.clone());

        let mut progress = RunProgress::new();
        let mut results: Vec<JobResult> = Vec::with_capacity(workflow.jobs.len());
        let mut tasks = JoinSet::new();
        let mut task_jobs = HashMap::new();

        loop {
            if cancel.is_cancelled() {
                for job in &workflow.jobs {
                    if !progress.is_started(&job.id) {
                        let result = JobResult::failure(
                            &job.id,
                            JobFailure::Cancelled,
                            Vec::new(),
                            Utc::now(),
                        );
                        self.finish_job(result, &mut progress, &mut results);
                    }
                }
            }

            // Skips can cascade through chains of `needs`
            loop {
                let blocked = self.scheduler.blocked_jobs(workflow, &progress);
                if blocked.is_empty() {
                    break;
                }
                for (job_id, dependency) in blocked {
                    info!(job = %job_id, dependency = %dependency, "skipping job");
                    self.finish_job(
                        JobResult::skipped(&job_id, &dependency),
                        &mut progress,
                        &mut results,
                    );
                }
            }

            for job_id in self.scheduler.next_jobs(workflow, &progress) {
                progress.mark_running(&job_id);
                self.events.emit(ExecutionEvent::JobStarted {
                    job_id: job_id.clone(),
                });

                let runner = job_runner.clone();
                let workflow = shared_workflow.clone();
                let event = shared_event.clone();
                let cancel = cancel.clone();
                let id = job_id.clone();
                let handle = tasks.spawn(async move {
                    match workflow.job(&id) {
                        Some(job) => runner.execute(&workflow, job, &event, &cancel).await,
                        None => JobResult::failure(
                            &id,
                            JobFailure::Aborted {
                                reason: "job missing from workflow".to_string(),
                            },
                            Vec::new(),
                            Utc::now(),
                        ),
                    }
                });
                task_jobs.insert(handle.id(), job_id);
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };

            let result = match joined {
                Ok((_, result)) => result,
                Err(join_error) => {
                    let job_id = task_jobs
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    error!(job = %job_id, "job task ended abnormally: {}", join_error);
                    JobResult::failure(
                        &job_id,
                        JobFailure::Aborted {
                            reason: join_error.to_string(),
                        },
                        Vec::new(),
                        started_at,
                    )
                }
            };
            self.finish_job(result, &mut progress, &mut results);
        }

        for job in &workflow.jobs {
            if !progress.is_started(&job.id) {
                warn!(job = %job.id, "job was never scheduled");
                let result = JobResult::failure(
                    &job.id,
                    JobFailure::Aborted {
                        reason: "never scheduled".to_string(),
                    },
                    Vec::new(),
                    Utc::now(),
                );
                self.finish_job(result, &mut progress, &mut results);
            }
        }

        let order: HashMap<&str, usize> = workflow
            .job_ids()
            .enumerate()
            .map(|(index, id)| (id, index))
            .collect();
        results.sort_by_key(|r| order.get(r.job_id.as_str()).copied().unwrap_or(usize::MAX));

        let run = RunResult::aggregate(run_id, &workflow.name, event.clone(), results, started_at);

        info!(
            workflow = %workflow.name,
            %run_id,
            status = %run.status,
            succeeded = run.count(JobStatus::Success),
            failed = run.count(JobStatus::Failure),
            skipped = run.count(JobStatus::Skipped),
            "workflow run finished"
        );
        self.events.emit(ExecutionEvent::RunFinished {
            run_id,
            status: run.status,
        });

        run
    }

    fn finish_job(&self, result: JobResult, progress: &mut RunProgress, results: &mut Vec<JobResult>) {
        progress.mark_finished(&result.job_id, result.status);
        self.events.emit(ExecutionEvent::JobFinished {
            job_id: result.job_id.clone(),
            status: result.status,
            failure: result.failure.clone(),
        });
        results.push(result);
    }
}
