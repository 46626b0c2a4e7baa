//! Invocation context: decides once, at process entry, whether this process is
//! the driver that submits a job array or one worker task of that array.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LaunchError, Result};

pub const DEFAULT_SCHEDULER: &str = "sbatch";
pub const DEFAULT_JOB_ID_VAR: &str = "SLURM_JOB_ID";
pub const DEFAULT_ARRAY_INDEX_VAR: &str = "SLURM_ARRAY_TASK_ID";

/// Scheduler binary and the environment variables the scheduler sets in
/// array tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default = "default_scheduler")]
    pub scheduler_binary: String,
    #[serde(default = "default_job_id_var")]
    pub job_id_var: String,
    #[serde(default = "default_array_index_var")]
    pub array_index_var: String,
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
}

fn default_scheduler() -> String {
    DEFAULT_SCHEDULER.to_string()
}

fn default_job_id_var() -> String {
    DEFAULT_JOB_ID_VAR.to_string()
}

fn default_array_index_var() -> String {
    DEFAULT_ARRAY_INDEX_VAR.to_string()
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            scheduler_binary: default_scheduler(),
            job_id_var: default_job_id_var(),
            array_index_var: default_array_index_var(),
            interpreter: None,
        }
    }
}

impl LauncherConfig {
    /// Defaults overridden by `REPRO_SCHEDULER`, `REPRO_JOB_ID_VAR`,
    /// `REPRO_ARRAY_INDEX_VAR` and `REPRO_INTERPRETER`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(v) = non_empty("REPRO_SCHEDULER") {
            config.scheduler_binary = v;
        }
        if let Some(v) = non_empty("REPRO_JOB_ID_VAR") {
            config.job_id_var = v;
        }
        if let Some(v) = non_empty("REPRO_ARRAY_INDEX_VAR") {
            config.array_index_var = v;
        }
        if let Some(v) = non_empty("REPRO_INTERPRETER") {
            config.interpreter = Some(PathBuf::from(v));
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationContext {
    Driver,
    Worker {
        job_id: String,
        index_var: String,
        /// Raw value of the array-index variable; validated by
        /// [`InvocationContext::array_index`].
        raw_index: Option<String>,
    },
}

impl InvocationContext {
    pub fn from_env(config: &LauncherConfig) -> Self {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(config: &LauncherConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let ctx = match lookup(&config.job_id_var) {
            Some(job_id) => InvocationContext::Worker {
                job_id,
                index_var: config.array_index_var.clone(),
                raw_index: lookup(&config.array_index_var),
            },
            None => InvocationContext::Driver,
        };
        debug!(worker = ctx.is_worker(), "resolved invocation context");
        ctx
    }

    /// Worker context with the given index, as the scheduler would set it.
    pub fn worker(job_id: impl Into<String>, index: usize) -> Self {
        InvocationContext::Worker {
            job_id: job_id.into(),
            index_var: DEFAULT_ARRAY_INDEX_VAR.to_string(),
            raw_index: Some(index.to_string()),
        }
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, InvocationContext::Worker { .. })
    }

    /// Array index of this worker. A driver has no index and reports the
    /// default index variable as unset.
    pub fn array_index(&self) -> Result<usize> {
        match self {
            InvocationContext::Worker {
                index_var,
                raw_index,
                ..
            } => raw_index
                .as_deref()
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .ok_or_else(|| LaunchError::MissingArrayIndex {
                    var: index_var.clone(),
                    value: raw_index.clone(),
                }),
            InvocationContext::Driver => Err(LaunchError::MissingArrayIndex {
                var: DEFAULT_ARRAY_INDEX_VAR.to_string(),
                value: None,
            }),
        }
    }
}
