//! CLI output formatting

use crate::{
    core::{JobResult, JobStatus, RunResult, RunStatus, StepResult, StepStatus},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Success => style("SUCCESS").green().to_string(),
        JobStatus::Failure => style("FAILURE").red().to_string(),
        JobStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_run_status(status: RunStatus) -> String {
    match status {
        RunStatus::Success => style("SUCCESS").green().to_string(),
        RunStatus::Failure => style("FAILURE").red().to_string(),
    }
}

pub fn format_step_status(status: &StepStatus) -> String {
    match status {
        StepStatus::Succeeded => style("ok").green().to_string(),
        StepStatus::Failed {
            exit_code: Some(code),
        } => style(format!("exit {}", code)).red().to_string(),
        StepStatus::Failed { exit_code: None } => style("failed").red().to_string(),
        StepStatus::TimedOut { limit } => style(format!("timed out after {}", format_duration(*limit)))
            .yellow()
            .to_string(),
        StepStatus::Cancelled => style("cancelled").yellow().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted { run_id, workflow } => format!(
            "{} Running workflow {} ({})",
            ROCKET,
            style(workflow).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::JobStarted { job_id } => {
            format!("{} {}", SPINNER, style(job_id).cyan().bold())
        }
        ExecutionEvent::StepStarted { job_id, step } => {
            format!("  {} {}", style(format!("[{}]", job_id)).dim(), step)
        }
        ExecutionEvent::StepFinished {
            job_id,
            step,
            status,
        } => {
            let icon = if status.is_success() { CHECK } else { CROSS };
            format!(
                "  {} {}{} ({})",
                style(format!("[{}]", job_id)).dim(),
                icon,
                step,
                format_step_status(status)
            )
        }
        ExecutionEvent::JobFinished {
            job_id,
            status,
            failure,
        } => {
            let icon = match status {
                JobStatus::Success => CHECK,
                JobStatus::Failure => CROSS,
                JobStatus::Skipped => SKIP,
            };
            match failure {
                Some(failure) => format!(
                    "{} {} {}: {}",
                    icon,
                    style(job_id).bold(),
                    format_job_status(*status),
                    style(failure).dim()
                ),
                None => format!("{} {} {}", icon, style(job_id).bold(), format_job_status(*status)),
            }
        }
        ExecutionEvent::RunFinished { run_id, status } => format!(
            "{} Run ({}) finished: {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_run_status(*status)
        ),
    }
}

/// Per-job table printed after a run
pub fn format_run_report(run: &RunResult) -> String {
    let mut lines = Vec::new();
    for job in &run.jobs {
        lines.push(format_job_line(job));
    }
    lines.push(format!(
        "{} succeeded, {} failed, {} skipped",
        style(run.count(JobStatus::Success)).green(),
        style(run.count(JobStatus::Failure)).red(),
        style(run.count(JobStatus::Skipped)).dim()
    ));
    lines.join("\n")
}

fn format_job_line(job: &JobResult) -> String {
    let duration = job.duration().to_std().unwrap_or_default();
    format!(
        "  {:<20} {} {}",
        style(&job.job_id).bold(),
        format_job_status(job.status),
        style(format_duration(duration)).dim()
    )
}

/// Output of the step that ended a failed job, if any
pub fn failing_step(job: &JobResult) -> Option<&StepResult> {
    job.steps.iter().rev().find(|step| !step.succeeded())
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Success => CHECK,
        RunStatus::Failure => CROSS,
    };

    format!(
        "{} {} - {} - {} {} → {} - {} ({}/{} jobs succeeded)",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.workflow).bold(),
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        summary.event_kind,
        style(&summary.target_branch).cyan(),
        format_run_status(summary.status),
        summary.succeeded_jobs,
        summary.total_jobs
    )
}

/// Format step output, keeping only the last `max_lines` lines
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.trim_end().to_string()
    } else {
        let kept = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}\n{}",
            style(format!("... ({} earlier lines)", lines.len() - max_lines)).dim(),
            kept
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
