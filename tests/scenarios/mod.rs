//! Workflow scenarios

mod cancellation;
mod dependencies;
mod pull_request_flow;
#[cfg(unix)]
mod shell_execution;
