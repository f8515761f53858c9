use anyhow::{Context, Result};
use cirun::cli::commands::{CheckCommand, HistoryCommand, RunCommand, ValidateCommand};
use cirun::cli::output::*;
use cirun::cli::{Cli, Command};
use cirun::core::config::WorkflowConfig;
use cirun::execution::{ColorChoice, Diagnostics, RunnerConfig, TriggerGate, WorkflowEngine};
use cirun::shell::SubprocessRunner;
use cirun::{JobStatus, RunResult};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let color: ColorChoice = cli.color.into();
    match color {
        ColorChoice::Always => console::set_colors_enabled(true),
        ColorChoice::Never => console::set_colors_enabled(false),
        ColorChoice::Auto => {}
    }

    // Execute command
    let success = match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, color).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::Check(cmd) => check_trigger(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}

async fn run_workflow(cmd: &RunCommand, color: ColorChoice) -> Result<bool> {
    let workflow = match WorkflowConfig::from_file(&cmd.file).and_then(|c| c.to_definition()) {
        Ok(workflow) => workflow,
        Err(e) => {
            eprintln!("{} Invalid workflow {}:", CROSS, cmd.file.display());
            eprintln!("  {}", style(e).red());
            return Ok(false);
        }
    };
    let event = cmd.event.to_event()?;

    let mut config = RunnerConfig::new()
        .with_strategy(cmd.strategy.to_strategy(cmd.max_parallel))
        .with_diagnostics(Diagnostics::new(color));
    if let Some(root) = &cmd.workspace_root {
        config = config.with_workspace_root(root);
    }
    if !cmd.labels.is_empty() {
        config = config.with_labels(cmd.labels.clone());
    }
    config.passthrough_env.extend(cmd.pass_env.iter().cloned());

    let mut engine = WorkflowEngine::new(SubprocessRunner::new(), config);
    if !cmd.json {
        engine.add_event_handler(|event| println!("{}", format_execution_event(&event)));
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let Some(run) = engine.dispatch_with_cancel(&workflow, &event, cancel).await else {
        if cmd.json {
            println!("{}", serde_json::json!({ "triggered": false }));
        } else {
            println!(
                "{} Workflow {} not triggered by {} on {}",
                INFO,
                style(&workflow.name).bold(),
                event.kind,
                style(&event.target_branch).cyan()
            );
        }
        return Ok(true);
    };

    if !cmd.no_history {
        save_history(&run).await;
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run_report(&run, cmd.tail);
    }

    Ok(run.is_success())
}

fn print_run_report(run: &RunResult, tail: usize) {
    println!();
    println!("{}", format_run_report(run));

    for job in run.jobs.iter().filter(|j| j.status == JobStatus::Failure) {
        if let Some(step) = failing_step(job) {
            let output = step.output();
            if !output.trim().is_empty() {
                println!(
                    "\n{} Output of {} / {}:",
                    WARN,
                    style(&job.job_id).bold(),
                    style(&step.name).bold()
                );
                println!("{}", format_output(&output, tail));
            }
        }
    }

    if run.is_success() {
        println!("\n{} {} {}", CHECK, style(&run.workflow).bold(), style("passed").green());
    } else {
        println!("\n{} {} {}", CROSS, style(&run.workflow).bold(), style("failed").red());
    }
}

#[cfg(feature = "sqlite")]
async fn save_history(run: &RunResult) {
    use cirun::persistence::{create_summary, HistoryBackend};

    let summary = create_summary(run);
    let saved = async {
        let store = cirun::persistence::SqliteRunStore::with_default_path().await?;
        store.save_run(&summary).await
    };
    if let Err(e) = saved.await {
        warn!("Failed to save run history: {:#}", e);
    }
}

#[cfg(not(feature = "sqlite"))]
async fn save_history(_run: &RunResult) {}

fn validate_workflow(cmd: &ValidateCommand) -> Result<bool> {
    println!("{} Validating workflow...", INFO);

    let result = WorkflowConfig::from_file(&cmd.file)
        .and_then(|config| config.to_definition().map(|def| (config, def)));

    match result {
        Ok((config, workflow)) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&workflow.name).bold());
            let kinds: Vec<String> = workflow
                .condition
                .accepted_kinds()
                .map(|k| k.to_string())
                .collect();
            println!("  Triggers: {}", style(kinds.join(", ")).cyan());
            for id in workflow.execution_order() {
                if let Some(job) = workflow.job(&id) {
                    println!(
                        "  Job {} ({} steps, runs-on {})",
                        style(&job.id).bold(),
                        style(job.steps.len()).cyan(),
                        job.runs_on
                    );
                }
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(true)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            Ok(false)
        }
    }
}

fn check_trigger(cmd: &CheckCommand) -> Result<bool> {
    let workflow = WorkflowConfig::from_file(&cmd.file)
        .and_then(|config| config.to_definition())
        .with_context(|| format!("Failed to load workflow {}", cmd.file.display()))?;
    let event = cmd.event.to_event()?;

    if TriggerGate::admit(&event, &workflow.condition) {
        println!(
            "{} {} on {} triggers {} ({} jobs)",
            CHECK,
            event.kind,
            style(&event.target_branch).cyan(),
            style(&workflow.name).bold(),
            workflow.jobs.len()
        );
    } else {
        println!(
            "{} {} on {} does not trigger {}",
            INFO,
            event.kind,
            style(&event.target_branch).cyan(),
            style(&workflow.name).bold()
        );
    }
    Ok(true)
}

#[cfg(feature = "sqlite")]
async fn show_history(cmd: &HistoryCommand) -> Result<bool> {
    use cirun::persistence::HistoryBackend;

    let store = cirun::persistence::SqliteRunStore::with_default_path().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(true);
    }

    let mut runs = match &cmd.workflow {
        Some(workflow) => store.list_runs(workflow).await?,
        None => {
            let mut all = Vec::new();
            for workflow in store.list_workflows().await? {
                all.extend(store.list_runs(&workflow).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    runs.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(true);
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(true)
}

#[cfg(not(feature = "sqlite"))]
async fn show_history(_cmd: &HistoryCommand) -> Result<bool> {
    tracing::error!("run history needs the `sqlite` feature");
    Ok(false)
}

#[cfg(feature = "sqlite")]
fn print_run_details(summary: &cirun::persistence::RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow).bold());
    println!("  Event: {} → {}", summary.event_kind, summary.target_branch);
    println!("  Status: {}", format_run_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Ok(duration) = summary
        .finished_at
        .signed_duration_since(summary.started_at)
        .to_std()
    {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    println!(
        "  Jobs: {} succeeded, {} failed, {} skipped",
        style(summary.succeeded_jobs).green(),
        style(summary.failed_jobs).red(),
        style(summary.skipped_jobs).dim()
    );
    Ok(())
}
