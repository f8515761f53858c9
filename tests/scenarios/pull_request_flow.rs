//! Test: pull request runs of the shipped CI workflow

use crate::helpers::*;
use cirun::{JobFailure, JobStatus, RunStatus, StepStatus};

const FORMAT: &str = "cargo fmt --all -- --check";
const LINT: &str = "cargo clippy --all-targets -- -D warnings";
const TEST: &str = "cargo test";

/// Clean formatting, no lint warnings, passing tests
#[tokio::test]
async fn test_clean_pull_request_succeeds() {
    let source = source_tree();
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new();
    let log = runner.log();

    let run = engine(runner, runner_config(root.path()))
        .dispatch(&ci_workflow(), &pull_request("main", source.path()))
        .await
        .expect("pull request to main should trigger");

    assert_eq!(run.status, RunStatus::Success);
    assert_job_status(&run, "lint", JobStatus::Success);
    assert_job_status(&run, "test", JobStatus::Success);
    assert_steps_recorded(&run, "lint", &["Checkout", "Format", "Lint"]);
    assert_steps_recorded(&run, "test", &["Checkout", "test"]);

    assert_eq!(log.scripts_for("lint"), vec![FORMAT, LINT]);
    assert_eq!(log.scripts_for("test"), vec![TEST]);
    assert!(leftover_workspaces(root.path()).is_empty());
}

/// Formatter reports a diff: lint stops at Format, test still passes, run fails
#[tokio::test]
async fn test_format_diff_fails_lint_only() {
    let source = source_tree();
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail(FORMAT, 1, "Diff in src/lib.rs at line 1\n");
    let log = runner.log();

    let run = engine(runner, runner_config(root.path()))
        .dispatch(&ci_workflow(), &pull_request("main", source.path()))
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failure);
    assert_job_status(&run, "lint", JobStatus::Failure);
    assert_job_status(&run, "test", JobStatus::Success);

    let lint = run.job("lint").unwrap();
    assert_eq!(
        lint.failure,
        Some(JobFailure::StepFailed {
            step: "Format".to_string()
        })
    );
    assert_steps_recorded(&run, "lint", &["Checkout", "Format"]);
    let format = lint.step("Format").unwrap();
    assert_eq!(format.status, StepStatus::Failed { exit_code: Some(1) });
    assert!(format.stdout.contains("Diff in src/lib.rs"));

    // The linter never ran
    assert_eq!(log.scripts_for("lint"), vec![FORMAT]);
}

/// Lint warnings fail the lint job after Format passed
#[tokio::test]
async fn test_lint_warning_fails_run() {
    let source = source_tree();
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail(LINT, 101, "error: unused variable `x`\n");

    let run = engine(runner, runner_config(root.path()))
        .run(&ci_workflow(), &pull_request("main", source.path()))
        .await;

    assert_eq!(run.status, RunStatus::Failure);
    assert_steps_recorded(&run, "lint", &["Checkout", "Format", "Lint"]);
    assert_eq!(run.job("lint").unwrap().steps[2].exit_code(), Some(101));
    assert_job_status(&run, "test", JobStatus::Success);
}

/// A failed checkout fails its job with no step results; siblings are unaffected
#[tokio::test]
async fn test_checkout_failure_is_environment_setup() {
    let root = tempfile::tempdir().unwrap();
    let workflow = workflow_from_yaml(
        r#"
name: CI
on:
  pull_request:
    branches: [main]
jobs:
  lint:
    runs-on: ubuntu-latest
    steps:
      - name: Lint
        run: cargo clippy --all-targets -- -D warnings
  test:
    runs-on: ubuntu-latest
    steps:
      - name: Checkout
        uses: actions/checkout@v4
      - name: test
        run: cargo test
"#,
    );
    let missing_source = root.path().join("no-such-checkout");
    let runner = ScriptedRunner::new();
    let log = runner.log();

    let run = engine(runner, runner_config(root.path()))
        .run(&workflow, &pull_request("main", &missing_source))
        .await;

    assert_eq!(run.status, RunStatus::Failure);
    assert_job_status(&run, "lint", JobStatus::Success);
    assert_job_status(&run, "test", JobStatus::Failure);

    let test = run.job("test").unwrap();
    assert!(matches!(
        test.failure,
        Some(JobFailure::EnvironmentSetup { .. })
    ));
    assert!(test.steps.is_empty());
    assert!(log.scripts_for("test").is_empty());
}

/// Jobs asking for a label this runner does not serve never start
#[tokio::test]
async fn test_unserved_label_is_environment_setup() {
    let source = source_tree();
    let root = tempfile::tempdir().unwrap();
    let config = runner_config(root.path()).with_labels(vec!["self-hosted".to_string()]);

    let run = engine(ScriptedRunner::new(), config)
        .run(&ci_workflow(), &pull_request("main", source.path()))
        .await;

    for job in &run.jobs {
        assert!(matches!(
            job.failure,
            Some(JobFailure::EnvironmentSetup { .. })
        ));
        assert!(job.steps.is_empty());
    }
}

/// Same event, same workflow, same source: same per-job statuses
#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let source = source_tree();
    let root = tempfile::tempdir().unwrap();
    let event = pull_request("main", source.path());
    let workflow = ci_workflow();
    let engine = engine(
        ScriptedRunner::new().fail(FORMAT, 1, "Diff\n"),
        runner_config(root.path()),
    );

    let first = engine.run(&workflow, &event).await;
    let second = engine.run(&workflow, &event).await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.status, second.status);
    assert_eq!(job_statuses(&first), job_statuses(&second));
}

/// Runner diagnostics settings change the step environment, never the outcome
#[tokio::test]
async fn test_color_setting_does_not_change_outcome() {
    use cirun::execution::{ColorChoice, Diagnostics};

    let source = source_tree();
    let event = pull_request("main", source.path());
    let workflow = ci_workflow();

    let mut outcomes = Vec::new();
    for color in [ColorChoice::Auto, ColorChoice::Always, ColorChoice::Never] {
        let root = tempfile::tempdir().unwrap();
        let config = runner_config(root.path()).with_diagnostics(Diagnostics::new(color));
        let run = engine(ScriptedRunner::new().fail(TEST, 1, "1 failed\n"), config)
            .run(&workflow, &event)
            .await;
        outcomes.push(job_statuses(&run));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[1], outcomes[2]);
}
