//! cirun - run GitHub-Actions-style CI workflows locally

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod shell;

// Re-export commonly used types
pub use core::config::{load_workflow, ConfigError, WorkflowConfig};
pub use core::{
    Event, EventKind, JobFailure, JobResult, JobStatus, RunResult, RunStatus, SourceSnapshot,
    StepResult, StepStatus, WorkflowDefinition,
};
pub use execution::{
    ExecutionEvent, RunnerConfig, SchedulingStrategy, TriggerGate, WorkflowEngine,
};
pub use shell::{CommandRunner, SubprocessRunner};
