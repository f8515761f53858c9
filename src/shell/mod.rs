//! Running external commands

pub mod invocation;
pub mod subprocess;

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use invocation::{CommandError, CommandOutput, Invocation, Termination};
pub use subprocess::SubprocessRunner;

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, timeout or cancellation
    ///
    /// Timeouts and cancellation are outcomes, not errors: they come back as
    /// [`Termination::TimedOut`] and [`Termination::Cancelled`] with whatever
    /// output was captured before the kill.
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, CommandError>;
}
