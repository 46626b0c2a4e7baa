use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::{info, warn};

use crate::context::LauncherConfig;
use crate::error::{LaunchError, Result};
use crate::shebang::LaunchTarget;

/// The scheduler command line a driver hands to the batch system. Only
/// [`Submission::new`] builds one, so an array is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    scheduler: String,
    options: Vec<String>,
    /// `None` submits a single job instead of an array.
    array_len: Option<usize>,
    script: PathBuf,
    forwarded: Vec<String>,
}

impl Submission {
    /// Checks the script's shebang before anything can be spawned.
    pub fn new(
        config: &LauncherConfig,
        target: &LaunchTarget,
        options: Vec<String>,
        array_len: Option<usize>,
    ) -> Result<Self> {
        let submission = Self::unchecked(config, target, options, array_len)?;
        target.validate()?;
        Ok(submission)
    }

    /// Same as [`Submission::new`] minus the shebang check, for callers that
    /// validate the target themselves before submitting.
    pub(crate) fn unchecked(
        config: &LauncherConfig,
        target: &LaunchTarget,
        options: Vec<String>,
        array_len: Option<usize>,
    ) -> Result<Self> {
        if array_len == Some(0) {
            return Err(LaunchError::EmptySweep);
        }
        Ok(Self {
            scheduler: config.scheduler_binary.clone(),
            options,
            array_len,
            script: target.script.clone(),
            forwarded: Vec::new(),
        })
    }

    pub fn forward<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forwarded.extend(args.into_iter().map(Into::into));
    }

    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn array_len(&self) -> Option<usize> {
        self.array_len
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn forwarded(&self) -> &[String] {
        &self.forwarded
    }

    pub fn array_flag(&self) -> Option<String> {
        self.array_len
            .and_then(|n| n.checked_sub(1))
            .map(|last| format!("--array=0-{}", last))
    }

    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.options.len() + self.forwarded.len() + 4);
        argv.push(self.scheduler.clone());
        argv.extend(self.options.iter().cloned());
        argv.extend(self.array_flag());
        argv.push("--".to_string());
        argv.push(self.script.to_string_lossy().into_owned());
        argv.extend(self.forwarded.iter().cloned());
        argv
    }
}

/// Runs a submission command and reports its exit code.
pub trait Submitter {
    fn submit(&self, argv: &[String]) -> Result<i32>;
}

/// Spawns the scheduler as a child process and waits for it. There is no
/// timeout: a hung scheduler hangs the driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSubmitter;

impl Submitter for ProcessSubmitter {
    fn submit(&self, argv: &[String]) -> Result<i32> {
        let (binary, args) = argv
            .split_first()
            .ok_or_else(|| LaunchError::SchedulerSpawn {
                binary: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            })?;
        info!(command = ?argv, "submitting to scheduler");
        let status = Command::new(binary)
            .args(args)
            .status()
            .map_err(|source| LaunchError::SchedulerSpawn {
                binary: binary.clone(),
                source,
            })?;
        let code = status.code().unwrap_or(1);
        if code != 0 {
            warn!(exit_code = code, "scheduler exited non-zero");
        }
        Ok(code)
    }
}

/// Records submissions instead of running them.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    pub exit_code: i32,
    calls: RefCell<Vec<Vec<String>>>,
}

impl RecordingSubmitter {
    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl Submitter for RecordingSubmitter {
    fn submit(&self, argv: &[String]) -> Result<i32> {
        self.calls.borrow_mut().push(argv.to_vec());
        Ok(self.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs;

    fn script_with_shebang(tag: &str, first_line: &str) -> (PathBuf, LaunchTarget) {
        let dir = std::env::temp_dir().join(format!(
            "repro_submit_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        let script = dir.join("sweep");
        fs::write(&script, format!("{}\n", first_line)).expect("write script");
        (dir, LaunchTarget::new(script, "/opt/bin/runner"))
    }

    #[test]
    fn argv_places_array_before_separator() {
        let (dir, target) = script_with_shebang("argv", "#!/opt/bin/runner");
        let mut submission = Submission::new(
            &LauncherConfig::default(),
            &target,
            vec!["--time".to_string(), "10".to_string()],
            Some(4),
        )
        .expect("submission");
        submission.forward(["--epochs", "5"]);
        let script = target.script.to_string_lossy().into_owned();
        assert_eq!(
            submission.argv(),
            vec!["sbatch", "--time", "10", "--array=0-3", "--", script.as_str(), "--epochs", "5"]
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn single_job_has_no_array_flag() {
        let (dir, target) = script_with_shebang("single", "#!/opt/bin/runner");
        let submission =
            Submission::new(&LauncherConfig::default(), &target, Vec::new(), None).expect("ok");
        assert_eq!(submission.array_flag(), None);
        assert_eq!(submission.argv()[1], "--");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn bad_shebang_never_builds_a_submission() {
        let (dir, target) = script_with_shebang("bad", "#!/bin/sh");
        let err = Submission::new(&LauncherConfig::default(), &target, Vec::new(), Some(2))
            .expect_err("shebang mismatch");
        assert!(matches!(err, LaunchError::ShebangMismatch { .. }));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn empty_array_is_rejected() {
        let (dir, target) = script_with_shebang("empty", "#!/opt/bin/runner");
        let err = Submission::new(&LauncherConfig::default(), &target, Vec::new(), Some(0))
            .expect_err("empty");
        assert!(matches!(err, LaunchError::EmptySweep));
        let err = Submission::unchecked(&LauncherConfig::default(), &target, Vec::new(), Some(0))
            .expect_err("empty without shebang check");
        assert!(matches!(err, LaunchError::EmptySweep));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn one_task_array_covers_index_zero() {
        let (dir, target) = script_with_shebang("one", "#!/opt/bin/runner");
        let submission = Submission::new(&LauncherConfig::default(), &target, Vec::new(), Some(1))
            .expect("submission");
        assert_eq!(submission.array_len(), Some(1));
        assert_eq!(submission.array_flag().as_deref(), Some("--array=0-0"));
        assert_eq!(submission.scheduler(), "sbatch");
        assert_eq!(submission.script(), target.script.as_path());
        assert!(submission.forwarded().is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn process_submitter_reports_exit_status() {
        let ok = ProcessSubmitter
            .submit(&["true".to_string()])
            .expect("spawn true");
        assert_eq!(ok, 0);
        let failed = ProcessSubmitter
            .submit(&["sh".to_string(), "-c".to_string(), "exit 3".to_string()])
            .expect("spawn sh");
        assert_eq!(failed, 3);
    }

    #[test]
    fn missing_scheduler_binary_is_a_spawn_error() {
        let err = ProcessSubmitter
            .submit(&["/nonexistent/repro-sbatch".to_string()])
            .expect_err("missing binary");
        assert!(matches!(err, LaunchError::SchedulerSpawn { .. }));
    }
}
