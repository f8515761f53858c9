//! Test: workflows driven through a real `sh`

use crate::helpers::*;
use cirun::{JobFailure, JobStatus, RunResult, RunStatus, StepStatus, SubprocessRunner};
use std::path::PathBuf;
use std::time::{Duration, Instant};

async fn run_yaml(yaml: &str, root: &std::path::Path) -> RunResult {
    let source = source_tree();
    engine(SubprocessRunner::new(), runner_config(root))
        .run(&workflow_from_yaml(yaml), &pull_request("main", source.path()))
        .await
}

#[tokio::test]
async fn test_steps_see_checked_out_tree() {
    let root = tempfile::tempdir().unwrap();
    let run = run_yaml(
        r#"
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - name: Inspect
        run: |
          test -f Cargo.toml
          test -f src/lib.rs
          echo "tree ok"
"#,
        root.path(),
    )
    .await;

    assert_eq!(run.status, RunStatus::Success, "{:?}", run.jobs);
    let inspect = run.job("build").unwrap().step("Inspect").unwrap();
    assert!(inspect.stdout.contains("tree ok"));
}

#[tokio::test]
async fn test_environment_layers_reach_steps() {
    let root = tempfile::tempdir().unwrap();
    let run = run_yaml(
        r#"
on: pull_request
env:
  GREETING: hello
  LEVEL: workflow
jobs:
  build:
    runs-on: ubuntu-latest
    env:
      LEVEL: job
    steps:
      - name: Show
        run: echo "$CI $GREETING $LEVEL $STEP_ONLY $CIRUN_JOB $CIRUN_BASE_REF"
        env:
          STEP_ONLY: step
"#,
        root.path(),
    )
    .await;

    let show = run.job("build").unwrap().step("Show").unwrap();
    assert_eq!(show.stdout, "true hello job step build main\n");
}

#[tokio::test]
async fn test_first_failing_step_stops_job() {
    let root = tempfile::tempdir().unwrap();
    let run = run_yaml(
        r#"
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: One
        run: echo one
      - name: Two
        run: |
          echo "broken" >&2
          exit 4
      - name: Three
        run: echo three
"#,
        root.path(),
    )
    .await;

    assert_job_status(&run, "build", JobStatus::Failure);
    assert_steps_recorded(&run, "build", &["One", "Two"]);
    let two = run.job("build").unwrap().step("Two").unwrap();
    assert_eq!(two.status, StepStatus::Failed { exit_code: Some(4) });
    assert_eq!(two.stderr, "broken\n");
}

#[tokio::test]
async fn test_step_timeout_kills_command() {
    let root = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let run = run_yaml(
        r#"
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Hang
        timeout-minutes: 0.005
        run: |
          echo waiting
          sleep 30
"#,
        root.path(),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    let job = run.job("build").unwrap();
    assert_eq!(
        job.failure,
        Some(JobFailure::StepTimedOut {
            step: "Hang".to_string()
        })
    );
    let hang = job.step("Hang").unwrap();
    assert!(hang.timed_out());
    assert!(hang.stdout.contains("waiting"));
}

#[tokio::test]
async fn test_job_timeout_bounds_steps() {
    let root = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let run = run_yaml(
        r#"
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    timeout-minutes: 0.005
    steps:
      - name: Hang
        run: sleep 30
"#,
        root.path(),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        run.job("build").unwrap().failure,
        Some(JobFailure::StepTimedOut {
            step: "Hang".to_string()
        })
    );
}

#[tokio::test]
async fn test_workspace_removed_after_job() {
    let root = tempfile::tempdir().unwrap();
    let run = run_yaml(
        r#"
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Where
        run: |
          touch scratch.txt
          echo "$CIRUN_WORKSPACE"
"#,
        root.path(),
    )
    .await;

    let where_step = run.job("build").unwrap().step("Where").unwrap();
    let workspace = PathBuf::from(where_step.stdout.trim());
    assert!(workspace.starts_with(root.path().canonicalize().unwrap()));
    assert_removed(&workspace);
    assert!(leftover_workspaces(root.path()).is_empty());
}

#[tokio::test]
async fn test_failed_checkout_discards_earlier_steps() {
    let root = tempfile::tempdir().unwrap();
    let run = run_yaml(
        r#"
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Block
        run: touch repo
      - uses: actions/checkout@v4
        with:
          path: repo/src
"#,
        root.path(),
    )
    .await;

    let job = run.job("build").unwrap();
    assert_eq!(job.status, JobStatus::Failure);
    assert!(matches!(
        job.failure,
        Some(JobFailure::EnvironmentSetup { .. })
    ));
    assert!(job.steps.is_empty());
}

#[tokio::test]
async fn test_background_process_does_not_outlive_job() {
    let root = tempfile::tempdir().unwrap();
    let marker_dir = tempfile::tempdir().unwrap();
    let marker = marker_dir.path().join("alive");
    let yaml = format!(
        r#"
on: pull_request
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Detach
        run: |
          (sleep 1; touch '{}') >/dev/null 2>&1 &
      - name: After
        run: echo done
"#,
        marker.display()
    );

    let run = run_yaml(&yaml, root.path()).await;
    assert_eq!(run.status, RunStatus::Success, "{:?}", run.jobs);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!marker.exists(), "background process survived its step");
}
