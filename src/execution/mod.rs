//! Workflow execution: gating, scheduling, and running jobs

pub mod config;
pub mod engine;
pub mod environment;
pub mod events;
pub mod executor;
pub mod gate;
pub mod job_runner;
pub mod scheduler;

pub use config::{ColorChoice, Diagnostics, RunnerConfig};
pub use engine::WorkflowEngine;
pub use environment::{JobEnvironment, ProvisionError};
pub use events::{EventEmitter, EventHandler, ExecutionEvent};
pub use executor::StepExecutor;
pub use gate::TriggerGate;
pub use job_runner::JobRunner;
pub use scheduler::{JobScheduler, RunProgress, SchedulingStrategy};
