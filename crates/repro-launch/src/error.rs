use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = LaunchError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(
        "shebang not found or faulty in {}: make sure the first line is exactly #!{}",
        .script.display(),
        .interpreter.display()
    )]
    ShebangMismatch {
        script: PathBuf,
        interpreter: PathBuf,
    },

    #[error("cannot read script {}: {source}", .path.display())]
    ScriptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve script path {}: {source}", .path.display())]
    ScriptPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing_array_index: {var} is {}", describe_raw(.value))]
    MissingArrayIndex { var: String, value: Option<String> },

    #[error("index_out_of_range: array index {index} has no configuration (sweep has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("empty_sweep: nothing to submit")]
    EmptySweep,

    #[error("cannot start scheduler {binary}: {source}")]
    SchedulerSpawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("scheduler submission failed with exit code {exit_code}")]
    SchedulerSubmissionFailure { exit_code: i32 },

    #[error(transparent)]
    Parse(#[from] clap::Error),
}

fn describe_raw(value: &Option<String>) -> String {
    match value {
        Some(raw) => format!("not an integer: '{}'", raw),
        None => "not set".to_string(),
    }
}

impl LaunchError {
    /// Process exit status a driver should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::SchedulerSubmissionFailure { exit_code } => *exit_code,
            LaunchError::Parse(err) => err.exit_code(),
            _ => 1,
        }
    }
}
