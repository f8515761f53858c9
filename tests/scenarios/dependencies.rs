//! Test: `needs:` ordering and scheduling strategies

use crate::helpers::*;
use cirun::{JobFailure, JobStatus, RunStatus, SchedulingStrategy};
use std::time::Duration;

const PIPELINE: &str = r#"
name: Pipeline
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: make build
  test:
    runs-on: ubuntu-latest
    needs: build
    steps:
      - run: make test
  docs:
    runs-on: ubuntu-latest
    steps:
      - run: make docs
  release:
    runs-on: ubuntu-latest
    needs: [test, docs]
    steps:
      - run: make release
"#;

#[tokio::test]
async fn test_dependents_run_after_dependencies() {
    let root = tempfile::tempdir().unwrap();
    let source = source_tree();
    let runner = ScriptedRunner::new();
    let log = runner.log();

    let run = engine(runner, runner_config(root.path()))
        .run(&workflow_from_yaml(PIPELINE), &pull_request("main", source.path()))
        .await;

    assert_eq!(run.status, RunStatus::Success);
    let order: Vec<String> = log.calls().into_iter().map(|c| c.job).collect();
    let position = |job: &str| order.iter().position(|j| j == job).unwrap();
    assert!(position("build") < position("test"));
    assert!(position("test") < position("release"));
    assert!(position("docs") < position("release"));

    // Results follow declaration order, not completion order
    let ids: Vec<&str> = run.jobs.iter().map(|j| j.job_id.as_str()).collect();
    assert_eq!(ids, vec!["build", "test", "docs", "release"]);
}

#[tokio::test]
async fn test_failed_dependency_skips_dependents() {
    let root = tempfile::tempdir().unwrap();
    let source = source_tree();
    let runner = ScriptedRunner::new().fail("make build", 2, "linker error\n");
    let log = runner.log();

    let run = engine(runner, runner_config(root.path()))
        .run(&workflow_from_yaml(PIPELINE), &pull_request("main", source.path()))
        .await;

    assert_eq!(run.status, RunStatus::Failure);
    assert_job_status(&run, "build", JobStatus::Failure);
    assert_job_status(&run, "test", JobStatus::Skipped);
    assert_job_status(&run, "docs", JobStatus::Success);
    assert_job_status(&run, "release", JobStatus::Skipped);

    assert_eq!(
        run.job("test").unwrap().failure,
        Some(JobFailure::DependencyFailed {
            job: "build".to_string()
        })
    );
    assert_eq!(
        run.job("release").unwrap().failure,
        Some(JobFailure::DependencyFailed {
            job: "test".to_string()
        })
    );
    assert!(log.scripts_for("test").is_empty());
    assert!(log.scripts_for("release").is_empty());
}

#[tokio::test]
async fn test_sequential_strategy_runs_one_job_at_a_time() {
    let root = tempfile::tempdir().unwrap();
    let source = source_tree();
    let runner = ScriptedRunner::new().with_delay(Duration::from_millis(50));
    let log = runner.log();
    let config = runner_config(root.path()).with_strategy(SchedulingStrategy::Sequential);

    let run = engine(runner, config)
        .run(&ci_workflow(), &pull_request("main", source.path()))
        .await;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(log.max_concurrency(), 1);
}

#[tokio::test]
async fn test_parallel_strategy_overlaps_independent_jobs() {
    let root = tempfile::tempdir().unwrap();
    let source = source_tree();
    let runner = ScriptedRunner::new().with_delay(Duration::from_millis(200));
    let log = runner.log();
    let config = runner_config(root.path()).with_strategy(SchedulingStrategy::Parallel);

    let run = engine(runner, config)
        .run(&ci_workflow(), &pull_request("main", source.path()))
        .await;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(log.max_concurrency(), 2);
}

#[tokio::test]
async fn test_limited_parallel_caps_running_jobs() {
    let root = tempfile::tempdir().unwrap();
    let source = source_tree();
    let workflow = workflow_from_yaml(
        r#"
on: pull_request
jobs:
  a:
    runs-on: ubuntu-latest
    steps: [{ run: a }]
  b:
    runs-on: ubuntu-latest
    steps: [{ run: b }]
  c:
    runs-on: ubuntu-latest
    steps: [{ run: c }]
  d:
    runs-on: ubuntu-latest
    steps: [{ run: d }]
"#,
    );
    let runner = ScriptedRunner::new().with_delay(Duration::from_millis(100));
    let log = runner.log();
    let config = runner_config(root.path()).with_strategy(SchedulingStrategy::LimitedParallel(2));

    let run = engine(runner, config)
        .run(&workflow, &pull_request("main", source.path()))
        .await;

    assert_eq!(run.count(JobStatus::Success), 4);
    assert!(log.max_concurrency() <= 2);
    assert_eq!(log.calls().len(), 4);
}
