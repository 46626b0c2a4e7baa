//! Driver/worker state machine shared by every launch variant.
//!
//! Launching happens in two phases. Planning (`plan_*`) decides, from the
//! invocation context alone, whether this process submits a job array or runs
//! one configuration of it; it spawns nothing. [`Launcher::execute`] is the
//! only step with side effects.

use tracing::{debug, info};

use crate::codec::{encode_options, OptionValue};
use crate::context::{InvocationContext, LauncherConfig};
use crate::error::{LaunchError, Result};
use crate::shebang::LaunchTarget;
use crate::submit::{ProcessSubmitter, Submission, Submitter};
use crate::sweep::{Configuration, SweepPlan};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlan<T> {
    /// Driver: submit and terminate.
    Submit(Submission),
    /// Worker: run the user body with this binding.
    Bound(T),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome<T> {
    Submitted { exit_code: i32 },
    Run(T),
}

impl<T> LaunchOutcome<T> {
    pub fn is_submitted(&self) -> bool {
        matches!(self, LaunchOutcome::Submitted { .. })
    }

    /// Converts a non-zero scheduler exit into an error.
    pub fn check(self) -> Result<Self> {
        match self {
            LaunchOutcome::Submitted { exit_code } if exit_code != 0 => {
                Err(LaunchError::SchedulerSubmissionFailure { exit_code })
            }
            other => Ok(other),
        }
    }

    /// Ends the driver process with the scheduler's exit status; a worker gets
    /// its binding back.
    pub fn terminate_if_submitted(self) -> T {
        match self {
            LaunchOutcome::Submitted { exit_code } => std::process::exit(exit_code),
            LaunchOutcome::Run(value) => value,
        }
    }
}

pub struct Launcher<S = ProcessSubmitter> {
    config: LauncherConfig,
    context: InvocationContext,
    target: Option<LaunchTarget>,
    submitter: S,
}

impl Launcher<ProcessSubmitter> {
    /// Reads configuration and invocation context from the process
    /// environment. Call once, at process entry.
    pub fn from_env() -> Self {
        let config = LauncherConfig::from_env();
        let context = InvocationContext::from_env(&config);
        Self::new(config, context)
    }

    pub fn new(config: LauncherConfig, context: InvocationContext) -> Self {
        Self {
            config,
            context,
            target: None,
            submitter: ProcessSubmitter,
        }
    }
}

impl<S: Submitter> Launcher<S> {
    /// Script to resubmit; defaults to the running program.
    pub fn with_target(mut self, target: LaunchTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_submitter<T: Submitter>(self, submitter: T) -> Launcher<T> {
        Launcher {
            config: self.config,
            context: self.context,
            target: self.target,
            submitter,
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    fn target(&self) -> Result<LaunchTarget> {
        match &self.target {
            Some(target) => Ok(target.clone()),
            None => LaunchTarget::current(&self.config),
        }
    }

    /// Driver-side submission command, shebang-checked.
    pub fn submission<I, K, V>(&self, options: I, array_len: Option<usize>) -> Result<Submission>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        let target = self.target()?;
        Submission::new(&self.config, &target, encode_options(options), array_len)
    }

    /// Submission whose target is validated later by the caller, once it
    /// knows the invocation will really submit.
    pub(crate) fn pending_submission<I, K, V>(
        &self,
        options: I,
        array_len: Option<usize>,
    ) -> Result<(Submission, LaunchTarget)>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        let target = self.target()?;
        let submission =
            Submission::unchecked(&self.config, &target, encode_options(options), array_len)?;
        Ok((submission, target))
    }

    /// Plan for a sweep derived from parameter declarations.
    pub fn plan_sweep<I, K, V>(&self, sweep: &SweepPlan, options: I) -> Result<LaunchPlan<Configuration>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        let digest = sweep.digest();
        if self.context.is_worker() {
            let index = self.context.array_index()?;
            let configuration = sweep.select(index)?;
            debug!(index, %digest, ?configuration, "bound sweep configuration");
            return Ok(LaunchPlan::Bound(configuration));
        }
        info!(array_len = sweep.array_len(), %digest, "planning sweep submission");
        let submission = self.submission(options, Some(sweep.array_len()))?;
        Ok(LaunchPlan::Submit(submission))
    }

    /// Plan for running the whole program once as a single remote job.
    pub fn plan_simple<I, K, V>(&self, options: I) -> Result<LaunchPlan<()>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        if self.context.is_worker() {
            return Ok(LaunchPlan::Bound(()));
        }
        Ok(LaunchPlan::Submit(self.submission(options, None)?))
    }

    /// Plan for a caller-owned enumeration. A worker walks `items` up to its
    /// index and keeps that element; later elements are never produced. A
    /// driver counts `items` to size the array.
    pub fn plan_multi<It, I, K, V>(&self, items: It, options: I) -> Result<LaunchPlan<It::Item>>
    where
        It: IntoIterator,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        if self.context.is_worker() {
            let index = self.context.array_index()?;
            let mut seen = 0usize;
            for item in items {
                if seen == index {
                    debug!(index, "bound multi element");
                    return Ok(LaunchPlan::Bound(item));
                }
                seen += 1;
            }
            return Err(LaunchError::IndexOutOfRange { index, len: seen });
        }
        let len = items.into_iter().count();
        info!(array_len = len, "planning multi submission");
        Ok(LaunchPlan::Submit(self.submission(options, Some(len))?))
    }

    /// Submits a driver plan and waits for the scheduler; hands a worker's
    /// binding back untouched.
    pub fn execute<T>(&self, plan: LaunchPlan<T>) -> Result<LaunchOutcome<T>> {
        match plan {
            LaunchPlan::Submit(submission) => {
                let exit_code = self.submitter.submit(&submission.argv())?;
                Ok(LaunchOutcome::Submitted { exit_code })
            }
            LaunchPlan::Bound(value) => Ok(LaunchOutcome::Run(value)),
        }
    }

    pub fn simple<I, K, V>(&self, options: I) -> Result<LaunchOutcome<()>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        let plan = self.plan_simple(options)?;
        self.execute(plan)
    }

    pub fn multi<It, I, K, V>(&self, items: It, options: I) -> Result<LaunchOutcome<It::Item>>
    where
        It: IntoIterator,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        let plan = self.plan_multi(items, options)?;
        self.execute(plan)
    }

    pub fn sweep<I, K, V>(&self, sweep: &SweepPlan, options: I) -> Result<LaunchOutcome<Configuration>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<OptionValue>,
    {
        let plan = self.plan_sweep(sweep, options)?;
        self.execute(plan)
    }
}
