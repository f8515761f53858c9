//! Core domain models for workflows
//!
//! This module defines the data structures that describe a workflow,
//! the events that trigger it, and the results of running it.

pub mod condition;
pub mod config;
pub mod event;
pub mod state;
pub mod step;
pub mod workflow;

pub use condition::*;
pub use event::*;
pub use state::*;
pub use step::*;
pub use workflow::*;
