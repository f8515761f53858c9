//! Test: cancelling a run

use crate::helpers::*;
use cirun::{JobFailure, JobStatus, RunStatus, StepStatus};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_cancel_mid_step_fails_running_jobs() {
    let root = tempfile::tempdir().unwrap();
    let source = source_tree();
    let runner = ScriptedRunner::new().with_delay(Duration::from_secs(30));
    let engine = engine(runner, runner_config(root.path()));
    let workflow = ci_workflow();
    let event = pull_request("main", source.path());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let run = tokio::time::timeout(
        Duration::from_secs(10),
        engine.run_with_cancel(&workflow, &event, cancel),
    )
    .await
    .expect("cancelled run should finish promptly");

    assert_eq!(run.status, RunStatus::Failure);
    for job in &run.jobs {
        assert_eq!(job.status, JobStatus::Failure);
        assert_eq!(job.failure, Some(JobFailure::Cancelled));
        let last = job.steps.last().expect("step in flight should be recorded");
        assert_eq!(last.status, StepStatus::Cancelled);
    }
    assert!(leftover_workspaces(root.path()).is_empty());
}

#[tokio::test]
async fn test_cancel_before_start_runs_nothing() {
    let root = tempfile::tempdir().unwrap();
    let source = source_tree();
    let runner = ScriptedRunner::new();
    let log = runner.log();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = engine(runner, runner_config(root.path()))
        .run_with_cancel(&ci_workflow(), &pull_request("main", source.path()), cancel)
        .await;

    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(run.jobs.len(), 2);
    for job in &run.jobs {
        assert_eq!(job.failure, Some(JobFailure::Cancelled));
        assert!(job.steps.is_empty());
    }
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_dependents_of_cancelled_jobs_do_not_start() {
    let root = tempfile::tempdir().unwrap();
    let source = source_tree();
    let workflow = workflow_from_yaml(
        r#"
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: make build
  deploy:
    runs-on: ubuntu-latest
    needs: build
    steps:
      - run: make deploy
"#,
    );
    let runner = ScriptedRunner::new().with_delay(Duration::from_secs(30));
    let log = runner.log();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let run = engine(runner, runner_config(root.path()))
        .run_with_cancel(&workflow, &pull_request("main", source.path()), cancel)
        .await;

    assert_eq!(run.job("build").unwrap().failure, Some(JobFailure::Cancelled));
    assert_ne!(run.job("deploy").unwrap().status, JobStatus::Success);
    assert!(log.scripts_for("deploy").is_empty());
}
