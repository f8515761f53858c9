//! Workflow configuration from YAML

use crate::core::{
    condition::{BranchPattern, Condition, TriggerRule},
    event::EventKind,
    step::{ActionRef, BuiltinAction, ShellKind, Step, StepAction},
    workflow::{Job, WorkflowDefinition},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// A malformed workflow declaration. Fatal at load time; no job runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read workflow file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workflow YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0}")]
    Invalid(String),
}

macro_rules! invalid {
    ($($arg:tt)*) => {
        return Err(ConfigError::Invalid(format!($($arg)*)))
    };
}

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    #[serde(default)]
    pub name: Option<String>,

    /// Activation triggers
    pub on: TriggerConfig,

    /// Environment shared by all jobs
    #[serde(default)]
    pub env: IndexMap<String, Value>,

    /// Jobs keyed by id, in declaration order
    pub jobs: IndexMap<String, JobConfig>,
}

/// The `on:` section: a single event, a list of events, or per-event filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    Single(String),
    List(Vec<String>),
    Filtered(IndexMap<String, Option<BranchFilterConfig>>),
}

/// Branch filters for one event kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BranchFilterConfig {
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default)]
    pub branches_ignore: Vec<String>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// Human-readable job name
    #[serde(default)]
    pub name: Option<String>,

    /// Runner label
    pub runs_on: String,

    #[serde(default)]
    pub env: IndexMap<String, Value>,

    /// Jobs that must succeed first
    #[serde(default)]
    pub needs: NeedsConfig,

    /// Overall job timeout in minutes (fractions allowed)
    #[serde(default)]
    pub timeout_minutes: Option<f64>,

    pub steps: Vec<StepConfig>,
}

/// `needs:` accepts a single job id or a list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NeedsConfig {
    One(String),
    Many(Vec<String>),
}

impl Default for NeedsConfig {
    fn default() -> Self {
        NeedsConfig::Many(Vec::new())
    }
}

impl NeedsConfig {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            NeedsConfig::One(id) => vec![id.clone()],
            NeedsConfig::Many(ids) => ids.clone(),
        }
    }
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepConfig {
    #[serde(default)]
    pub name: Option<String>,

    /// Reusable action reference (`owner/repo@version`)
    #[serde(default)]
    pub uses: Option<String>,

    /// Inline shell command
    #[serde(default)]
    pub run: Option<String>,

    /// Action inputs
    #[serde(default)]
    pub with: IndexMap<String, Value>,

    #[serde(default)]
    pub env: IndexMap<String, Value>,

    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default)]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub timeout_minutes: Option<f64>,
}

/// Job ids start with a letter or `_` and contain only `[A-Za-z0-9_-]`
fn is_valid_job_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    ///
    /// A workflow without a `name` is named after the file stem.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml(&content)?;
        if config.name.is_none() {
            config.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        Ok(config)
    }

    /// Parse workflow configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_definition().map(|_| ())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    /// Resolve into an immutable workflow definition
    ///
    /// Branch globs are compiled and action references resolved here, once.
    pub fn to_definition(&self) -> Result<WorkflowDefinition, ConfigError> {
        if self.jobs.is_empty() {
            invalid!("Workflow '{}' declares no jobs", self.display_name());
        }

        let condition = self.condition()?;
        let env = env_map(&self.env, "workflow env")?;

        let mut jobs = Vec::with_capacity(self.jobs.len());
        for (id, job_config) in &self.jobs {
            jobs.push(job_config.to_job(id)?);
        }

        // Check that all dependencies reference existing jobs
        let job_ids: HashSet<&str> = self.jobs.keys().map(String::as_str).collect();
        for job in &jobs {
            for dep in &job.needs {
                if !job_ids.contains(dep.as_str()) {
                    invalid!("Job '{}' needs non-existent job '{}'", job.id, dep);
                }
            }
        }

        self.check_cycles()?;

        Ok(WorkflowDefinition {
            name: self.display_name().to_string(),
            condition,
            env,
            jobs,
        })
    }

    fn condition(&self) -> Result<Condition, ConfigError> {
        let entries: Vec<(String, BranchFilterConfig)> = match &self.on {
            TriggerConfig::Single(kind) => vec![(kind.clone(), BranchFilterConfig::default())],
            TriggerConfig::List(kinds) => kinds
                .iter()
                .map(|kind| (kind.clone(), BranchFilterConfig::default()))
                .collect(),
            TriggerConfig::Filtered(map) => map
                .iter()
                .map(|(kind, filter)| (kind.clone(), filter.clone().unwrap_or_default()))
                .collect(),
        };

        if entries.is_empty() {
            invalid!("Workflow '{}' has an empty 'on' section", self.display_name());
        }

        let mut rules = Vec::with_capacity(entries.len());
        for (name, filter) in entries {
            let kind = EventKind::parse(&name);
            if !kind.is_known() {
                invalid!("Unsupported trigger event '{}'", name);
            }
            rules.push(TriggerRule {
                kind,
                branches: compile_patterns(&filter.branches)?,
                branches_ignore: compile_patterns(&filter.branches_ignore)?,
            });
        }

        Ok(Condition::new(rules))
    }

    /// Check for cycles in the `needs` graph
    fn check_cycles(&self) -> Result<(), ConfigError> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for id in self.jobs.keys() {
            if !visited.contains(id) {
                self.dfs_check(id, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        job_id: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<(), ConfigError> {
        visited.insert(job_id.to_string());
        recursion_stack.insert(job_id.to_string());

        if let Some(job) = self.jobs.get(job_id) {
            for dep in job.needs.to_vec() {
                if recursion_stack.contains(&dep) {
                    invalid!("Cycle detected in job dependencies involving '{}'", dep);
                }
                if !visited.contains(&dep) {
                    self.dfs_check(&dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(job_id);
        Ok(())
    }
}

impl JobConfig {
    fn to_job(&self, id: &str) -> Result<Job, ConfigError> {
        if !is_valid_job_id(id) {
            invalid!("Invalid job id '{}'", id);
        }
        if self.runs_on.trim().is_empty() {
            invalid!("Job '{}' has an empty runs-on label", id);
        }
        if self.steps.is_empty() {
            invalid!("Job '{}' has no steps", id);
        }

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| step.to_step(id, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Job {
            id: id.to_string(),
            name: self.name.clone().unwrap_or_else(|| id.to_string()),
            runs_on: self.runs_on.trim().to_string(),
            env: env_map(&self.env, &format!("job '{}' env", id))?,
            needs: self.needs.to_vec(),
            timeout: minutes(self.timeout_minutes, &format!("job '{}'", id))?,
            steps,
        })
    }
}

impl StepConfig {
    fn to_step(&self, job_id: &str, index: usize) -> Result<Step, ConfigError> {
        let label = match &self.name {
            Some(name) => format!("step '{}' of job '{}'", name, job_id),
            None => format!("step #{} of job '{}'", index + 1, job_id),
        };

        let (action, default_name) = match (&self.uses, &self.run) {
            (Some(_), Some(_)) => invalid!("{} sets both 'uses' and 'run'", label),
            (None, None) => invalid!("{} needs either 'uses' or 'run'", label),
            (Some(reference), None) => {
                if self.shell.is_some() {
                    invalid!("{} sets 'shell' on an action step", label);
                }
                (self.resolve_action(reference, &label)?, format!("Run {}", reference))
            }
            (None, Some(script)) => {
                if script.trim().is_empty() {
                    invalid!("{} has an empty 'run' command", label);
                }
                let shell = match &self.shell {
                    Some(name) => match ShellKind::parse(name) {
                        Some(shell) => shell,
                        None => invalid!("{} uses unsupported shell '{}'", label, name),
                    },
                    None => ShellKind::default(),
                };
                let first_line = script.lines().next().unwrap_or_default().trim().to_string();
                (
                    StepAction::Run {
                        script: script.clone(),
                        shell,
                    },
                    first_line,
                )
            }
        };

        let working_directory = match &self.working_directory {
            Some(dir) => Some(relative_path(dir, &label)?),
            None => None,
        };

        Ok(Step {
            name: self.name.clone().unwrap_or(default_name),
            action,
            env: env_map(&self.env, &label)?,
            working_directory,
            timeout: minutes(self.timeout_minutes, &label)?,
        })
    }

    fn resolve_action(&self, reference: &str, label: &str) -> Result<StepAction, ConfigError> {
        let action = match ActionRef::parse(reference) {
            Some(action) => action,
            None => invalid!("{} has malformed action reference '{}'", label, reference),
        };

        if !action.is_checkout() {
            invalid!("{} uses unsupported action '{}'", label, action);
        }

        let path = match self.with.get("path") {
            Some(Value::String(path)) => Some(relative_path(path, label)?),
            Some(other) => invalid!("{} has non-string checkout path: {:?}", label, other),
            None => None,
        };

        Ok(StepAction::Uses(BuiltinAction::Checkout { path }))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<BranchPattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            BranchPattern::compile(pattern)
                .map_err(|e| ConfigError::Invalid(format!("Invalid branch pattern '{}': {}", pattern, e)))
        })
        .collect()
}

/// Scalars become strings; anything else is rejected
fn env_map(values: &IndexMap<String, Value>, owner: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut env = BTreeMap::new();
    for (key, value) in values {
        if key.is_empty() || key.contains('=') {
            invalid!("Invalid environment variable name '{}' in {}", key, owner);
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            _ => invalid!("Environment variable '{}' in {} must be a scalar", key, owner),
        };
        env.insert(key.clone(), rendered);
    }
    Ok(env)
}

fn minutes(value: Option<f64>, owner: &str) -> Result<Option<Duration>, ConfigError> {
    match value {
        None => Ok(None),
        Some(m) if m.is_finite() && m > 0.0 => match Duration::try_from_secs_f64(m * 60.0) {
            Ok(limit) => Ok(Some(limit)),
            Err(_) => invalid!("timeout-minutes for {} is out of range, got {}", owner, m),
        },
        Some(m) => invalid!("timeout-minutes for {} must be positive, got {}", owner, m),
    }
}

/// Paths must stay inside the workspace
fn relative_path(raw: &str, owner: &str) -> Result<PathBuf, ConfigError> {
    let path = PathBuf::from(raw);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if raw.trim().is_empty() || escapes {
        invalid!("Path '{}' in {} must be relative to the workspace", raw, owner);
    }
    Ok(path)
}

/// Load, validate and resolve a workflow file in one go
pub fn load_workflow<P: AsRef<Path>>(path: P) -> Result<WorkflowDefinition, ConfigError> {
    WorkflowConfig::from_file(path)?.to_definition()
}
