//! Step executor - runs individual `run` steps in a job environment

use crate::core::{Step, StepAction, StepResult, StepStatus};
use crate::execution::{Diagnostics, JobEnvironment};
use crate::shell::{CommandRunner, Invocation, Termination};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executes a single step. Holds no per-step state.
pub struct StepExecutor<R> {
    runner: Arc<R>,
    diagnostics: Diagnostics,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: Arc<R>, diagnostics: Diagnostics) -> Self {
        Self {
            runner,
            diagnostics,
        }
    }

    /// Build the shell invocation for a step
    ///
    /// Returns `None` for steps that are not shell commands.
    pub fn invocation(&self, step: &Step, env: &JobEnvironment) -> Option<Invocation> {
        let StepAction::Run { script, shell } = &step.action else {
            return None;
        };

        let mut vars = env.env().clone();
        vars.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (key, value) in self.diagnostics.env_vars() {
            vars.insert(key.to_string(), value.to_string());
        }

        let working_dir = match &step.working_directory {
            Some(dir) => env.workspace().join(dir),
            None => env.workspace().to_path_buf(),
        };

        let (program, args) = shell.command();
        Some(
            Invocation::new(program, working_dir)
                .args(args.iter().copied())
                .arg(script.as_str())
                .envs(vars),
        )
    }

    /// Run a step to completion, timeout or cancellation
    pub async fn run(
        &self,
        step: &Step,
        env: &JobEnvironment,
        limit: Option<Duration>,
        cancel: &CancellationToken,
    ) -> StepResult {
        let started_at = Utc::now();
        info!(step = %step.name, "running step");

        let Some(invocation) = self.invocation(step, env) else {
            warn!(step = %step.name, "step is not a shell command");
            return StepResult {
                name: step.name.clone(),
                status: StepStatus::Failed { exit_code: None },
                stdout: String::new(),
                stderr: format!("step '{}' has no command to run", step.name),
                started_at,
                finished_at: Utc::now(),
            };
        };

        debug!(step = %step.name, command = %invocation.display(), "step invocation");

        let (status, stdout, stderr) = match self.runner.run(&invocation, limit, cancel).await {
            Ok(output) => {
                let status = match output.termination {
                    Termination::Exited(0) => StepStatus::Succeeded,
                    Termination::Exited(code) => StepStatus::Failed {
                        exit_code: Some(code),
                    },
                    Termination::Signaled => StepStatus::Failed { exit_code: None },
                    Termination::TimedOut(limit) => StepStatus::TimedOut { limit },
                    Termination::Cancelled => StepStatus::Cancelled,
                };
                (status, output.stdout, output.stderr)
            }
            Err(e) => {
                warn!(step = %step.name, "step could not run: {}", e);
                (StepStatus::Failed { exit_code: None }, String::new(), format!("{}\n", e))
            }
        };

        match &status {
            StepStatus::Succeeded => info!(step = %step.name, "step succeeded"),
            other => warn!(step = %step.name, status = ?other, "step did not succeed"),
        }

        StepResult {
            name: step.name.clone(),
            status,
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
