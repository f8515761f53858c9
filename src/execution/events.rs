//! Lifecycle events emitted while a workflow runs

use crate::core::{JobFailure, JobStatus, RunStatus, StepStatus};
use std::sync::Arc;
use uuid::Uuid;

/// Events that can occur during a workflow run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        workflow: String,
    },
    JobStarted {
        job_id: String,
    },
    StepStarted {
        job_id: String,
        step: String,
    },
    StepFinished {
        job_id: String,
        step: String,
        status: StepStatus,
    },
    JobFinished {
        job_id: String,
        status: JobStatus,
        failure: Option<JobFailure>,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to registered handlers. Cheap to clone into job tasks.
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Vec<EventHandler>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    pub fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
