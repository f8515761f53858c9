//! Per-job isolated environment: a fresh workspace and a clean process env

use crate::core::{Event, Job, SourceSnapshot, WorkflowDefinition};
use crate::execution::RunnerConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while preparing a job's environment
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("No runner serves label '{label}' (available: {available})")]
    UnsupportedLabel { label: String, available: String },

    #[error("Failed to create workspace under {root}: {source}")]
    Workspace {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source snapshot {0} does not exist or is not a directory")]
    MissingSource(PathBuf),

    #[error("Failed to copy {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkout task failed: {0}")]
    Task(String),
}

/// Workspace and environment owned by exactly one job
///
/// The workspace directory is removed by [`JobEnvironment::teardown`], or on
/// drop if the job never got that far.
#[derive(Debug)]
pub struct JobEnvironment {
    job_id: String,
    workspace: TempDir,
    env: BTreeMap<String, String>,
}

impl JobEnvironment {
    /// Create the workspace and build the job's environment
    pub fn provision(
        workflow: &WorkflowDefinition,
        job: &Job,
        event: &Event,
        config: &RunnerConfig,
    ) -> Result<Self, ProvisionError> {
        if !config.serves(&job.runs_on) {
            return Err(ProvisionError::UnsupportedLabel {
                label: job.runs_on.clone(),
                available: config.labels.join(", "),
            });
        }

        let workspace_error = |source| ProvisionError::Workspace {
            root: config.workspace_root.clone(),
            source,
        };
        fs::create_dir_all(&config.workspace_root).map_err(workspace_error)?;
        // Absolute, so steps and checkout agree on where the workspace is
        let root = fs::canonicalize(&config.workspace_root).map_err(workspace_error)?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("cirun-{}-", job.id))
            .tempdir_in(&root)
            .map_err(workspace_error)?;

        let mut env = BTreeMap::new();
        for name in &config.passthrough_env {
            if let Ok(value) = std::env::var(name) {
                env.insert(name.clone(), value);
            }
        }

        env.insert("CI".to_string(), "true".to_string());
        env.insert(
            "CIRUN_WORKSPACE".to_string(),
            workspace.path().display().to_string(),
        );
        env.insert("CIRUN_WORKFLOW".to_string(), workflow.name.clone());
        env.insert("CIRUN_JOB".to_string(), job.id.clone());
        env.insert("CIRUN_EVENT_NAME".to_string(), event.kind.to_string());
        env.insert("CIRUN_BASE_REF".to_string(), event.target_branch.clone());
        if let Some(revision) = &event.source.revision {
            env.insert("CIRUN_SHA".to_string(), revision.clone());
        }

        env.extend(workflow.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(job.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        debug!(
            job = %job.id,
            workspace = %workspace.path().display(),
            vars = env.len(),
            "provisioned job environment"
        );

        Ok(Self {
            job_id: job.id.clone(),
            workspace,
            env,
        })
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Copy the source snapshot into the workspace (or a subdirectory of it)
    ///
    /// Symlinks and the snapshot's excluded top-level entries are skipped.
    /// Returns the number of files copied.
    pub async fn checkout(
        &self,
        source: &SourceSnapshot,
        path: Option<&Path>,
    ) -> Result<u64, ProvisionError> {
        let root = source.root.clone();
        if !root.is_dir() {
            return Err(ProvisionError::MissingSource(root));
        }

        let dest = match path {
            Some(sub) => self.workspace().join(sub),
            None => self.workspace().to_path_buf(),
        };
        let exclude = source.exclude.clone();
        let workspace = self.workspace().to_path_buf();

        let copied = tokio::task::spawn_blocking(move || {
            // Entries are compared against the workspace, so both sides must be canonical
            let root = fs::canonicalize(&root).map_err(|source| ProvisionError::Copy {
                path: root.clone(),
                source,
            })?;
            fs::create_dir_all(&dest).map_err(|source| ProvisionError::Copy {
                path: dest.clone(),
                source,
            })?;
            copy_tree(&root, &dest, &exclude, &workspace)
        })
        .await
        .map_err(|e| ProvisionError::Task(e.to_string()))??;

        info!(
            job = %self.job_id,
            files = copied,
            revision = source.revision.as_deref().unwrap_or("unknown"),
            "checked out source"
        );
        Ok(copied)
    }

    /// Remove the workspace
    pub fn teardown(self) -> std::io::Result<()> {
        debug!(job = %self.job_id, "tearing down workspace");
        self.workspace.close()
    }
}

/// Recursively copy `src` into `dst`
///
/// `exclude` names are matched against top-level entries only. Neither the
/// workspace nor the directory holding it is copied.
fn copy_tree(
    src: &Path,
    dst: &Path,
    exclude: &[String],
    workspace: &Path,
) -> Result<u64, ProvisionError> {
    let mut copied = 0;
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf(), true)];

    while let Some((from_dir, to_dir, top_level)) = pending.pop() {
        let entries = fs::read_dir(&from_dir).map_err(|source| ProvisionError::Copy {
            path: from_dir.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| ProvisionError::Copy {
                path: from_dir.clone(),
                source,
            })?;
            let from = entry.path();
            let name = entry.file_name();

            if top_level && exclude.iter().any(|e| name.to_string_lossy() == e.as_str()) {
                continue;
            }
            if from == workspace || Some(from.as_path()) == workspace.parent() {
                continue;
            }

            let file_type = entry.file_type().map_err(|source| ProvisionError::Copy {
                path: from.clone(),
                source,
            })?;
            let to = to_dir.join(&name);

            if file_type.is_symlink() {
                debug!(path = %from.display(), "skipping symlink");
            } else if file_type.is_dir() {
                fs::create_dir_all(&to).map_err(|source| ProvisionError::Copy {
                    path: to.clone(),
                    source,
                })?;
                pending.push((from, to, false));
            } else {
                fs::copy(&from, &to).map_err(|source| ProvisionError::Copy {
                    path: from.clone(),
                    source,
                })?;
                copied += 1;
            }
        }
    }

    Ok(copied)
}
