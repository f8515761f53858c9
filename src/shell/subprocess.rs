//! Subprocess runner - spawns commands with tokio and captures their output

use crate::shell::{CommandError, CommandOutput, CommandRunner, Invocation, Termination};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lines longer than this are truncated (64 KiB)
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// How long to wait for output pipes to close after the child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(2);

type SharedBuffer = Arc<Mutex<String>>;

fn lock(buffer: &SharedBuffer) -> MutexGuard<'_, String> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs commands as real child processes
///
/// Each child leads its own process group so a timeout or cancellation kills
/// everything the command started, not just the shell.
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }
}

enum ExitReason {
    Completed(ExitStatus),
    WaitError(std::io::Error),
    Timeout(Duration),
    Cancelled,
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, CommandError> {
        if !invocation.working_dir.is_dir() {
            return Err(CommandError::MissingWorkingDir(invocation.working_dir.clone()));
        }

        debug!(
            command = %invocation.display(),
            working_dir = %invocation.working_dir.display(),
            timeout_secs = timeout.map(|t| t.as_secs_f64()),
            "spawning command"
        );

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .env_clear()
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        // `child.id()` is gone once the child is reaped; the group outlives it
        let group = child.id();

        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(spawn_reader(pipe, stdout.clone()));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(spawn_reader(pipe, stderr.clone()));
        }

        let deadline = async {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let exit_reason = tokio::select! {
            wait_result = child.wait() => match wait_result {
                Ok(status) => ExitReason::Completed(status),
                Err(e) => ExitReason::WaitError(e),
            },
            limit = deadline => ExitReason::Timeout(limit),
            _ = cancel.cancelled() => ExitReason::Cancelled,
        };

        let termination = match exit_reason {
            ExitReason::Completed(status) => {
                // Background processes the step left behind die with it
                kill_group(group);
                match status.code() {
                    Some(code) => Termination::Exited(code),
                    None => Termination::Signaled,
                }
            }
            ExitReason::WaitError(source) => {
                kill_process_group(&mut child, group).await;
                return Err(CommandError::Wait {
                    program: invocation.program.clone(),
                    source,
                });
            }
            ExitReason::Timeout(limit) => {
                warn!(
                    command = %invocation.display(),
                    timeout_secs = limit.as_secs_f64(),
                    "command timed out"
                );
                kill_process_group(&mut child, group).await;
                Termination::TimedOut(limit)
            }
            ExitReason::Cancelled => {
                info!(command = %invocation.display(), "command cancelled");
                kill_process_group(&mut child, group).await;
                Termination::Cancelled
            }
        };

        // Output written before the kill is kept even if a stray descendant
        // still holds the pipes open.
        for mut reader in readers {
            if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                debug!("output pipe still open after exit, abandoning reader");
                reader.abort();
            }
        }

        let stdout = std::mem::take(&mut *lock(&stdout));
        let stderr = std::mem::take(&mut *lock(&stderr));

        debug!(
            ?termination,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "command finished"
        );

        Ok(CommandOutput {
            termination,
            stdout,
            stderr,
            duration: started.elapsed(),
        })
    }
}

/// Read a pipe line by line into a shared buffer until EOF
fn spawn_reader<R>(pipe: R, buffer: SharedBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = truncate_line(String::from_utf8_lossy(&line).into_owned());
                    lock(&buffer).push_str(&text);
                }
                Err(e) => {
                    warn!("error reading command output: {}", e);
                    break;
                }
            }
        }
    })
}

fn truncate_line(mut line: String) -> String {
    if line.len() <= MAX_LINE_LENGTH {
        return line;
    }
    let mut cut = MAX_LINE_LENGTH;
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    line.truncate(cut);
    line.push_str("... [truncated]\n");
    line
}

/// SIGKILL every process still in the group led by `group`
fn kill_group(group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = group {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => debug!(pid, "killpg failed: {}", e),
        }
    }
    #[cfg(not(unix))]
    let _ = group;
}

/// SIGKILL the child's whole process group, then reap the child
async fn kill_process_group(child: &mut Child, group: Option<u32>) {
    kill_group(group);

    if let Err(e) = child.kill().await {
        debug!("kill after group signal failed: {}", e);
    }
}
