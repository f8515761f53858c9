//! Workflow domain model

use crate::core::{condition::Condition, step::Step};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// An immutable, validated workflow
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,

    /// When the workflow activates
    pub condition: Condition,

    /// Environment shared by every job
    pub env: BTreeMap<String, String>,

    /// Jobs in declaration order
    pub jobs: Vec<Job>,
}

/// A job: ordered steps in one isolated environment
#[derive(Debug, Clone)]
pub struct Job {
    /// Key under `jobs:`
    pub id: String,

    /// Display name (defaults to the id)
    pub name: String,

    /// Runner label the job asks for
    pub runs_on: String,

    /// Job-level environment (overrides workflow env)
    pub env: BTreeMap<String, String>,

    /// Jobs that must succeed before this one starts
    pub needs: Vec<String>,

    /// Overall time limit, used for steps without their own
    pub timeout: Option<Duration>,

    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Job {
    pub fn new(id: &str, runs_on: &str, steps: Vec<Step>) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            runs_on: runs_on.to_string(),
            env: BTreeMap::new(),
            needs: Vec::new(),
            timeout: None,
            steps,
        }
    }

    pub fn with_needs(mut self, needs: &[&str]) -> Self {
        self.needs = needs.iter().map(|n| n.to_string()).collect();
        self
    }

}

impl WorkflowDefinition {
    /// Get a job by id
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn job_ids(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|job| job.id.as_str())
    }

    /// Job ids ordered so every job comes after its `needs`
    ///
    /// Ties keep declaration order.
    pub fn execution_order(&self) -> Vec<String> {
        let by_id: HashMap<&str, &Job> = self.jobs.iter().map(|j| (j.id.as_str(), j)).collect();
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        for job in &self.jobs {
            Self::visit(&job.id, &by_id, &mut visited, &mut result);
        }

        result
    }

    fn visit(
        job_id: &str,
        jobs: &HashMap<&str, &Job>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(job_id.to_string()) {
            return;
        }

        if let Some(job) = jobs.get(job_id) {
            for dep in &job.needs {
                Self::visit(dep, jobs, visited, result);
            }
        }

        result.push(job_id.to_string());
    }
}
