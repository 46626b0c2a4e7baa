//! Declarative sweep over a `clap` command.
//!
//! Arguments registered with [`SweepCommand::swept`] define the sweep; every
//! other argument is passed through. The driver parses its own command line,
//! forwards the non-swept values to the job array, and exits. Each worker gets
//! its configuration as argument defaults and parses the forwarded flags.

use std::ffi::OsString;

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgMatches, Command};
use tracing::debug;

use crate::codec::{forward_matches, OptionValue};
use crate::error::{LaunchError, Result};
use crate::launch::{LaunchOutcome, LaunchPlan, Launcher};
use crate::shebang::LaunchTarget;
use crate::submit::{Submission, Submitter};
use crate::sweep::{enumerate, Configuration, Parameter, SweepPlan};

pub struct SweepCommand {
    command: Command,
    parameters: Vec<Parameter>,
    scheduler_options: Vec<(String, OptionValue)>,
}

impl SweepCommand {
    pub fn new(command: Command) -> Self {
        let parameters = command
            .get_arguments()
            .map(|arg| Parameter::fixed(arg.get_id().as_str()))
            .collect();
        Self {
            command,
            parameters,
            scheduler_options: Vec::new(),
        }
    }

    /// Adds an argument whose value is drawn from `values`, one per array
    /// task.
    pub fn swept<I, S>(mut self, arg: Arg, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let parameter = Parameter::swept(arg.get_id().as_str(), values.clone());
        let arg = arg
            .value_parser(PossibleValuesParser::new(values))
            .required(false);
        self.command = self.command.arg(arg);
        self.parameters.push(parameter);
        self
    }

    /// Adds an argument that is forwarded verbatim from driver to workers.
    pub fn fixed(mut self, arg: Arg) -> Self {
        let name = arg.get_id().to_string();
        self.parameters.push(match arg.get_default_values().first() {
            Some(value) => Parameter::fixed_with(name, value.to_string_lossy()),
            None => Parameter::fixed(name),
        });
        self.command = self.command.arg(arg);
        self
    }

    pub fn scheduler_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.scheduler_options.push((name.into(), value.into()));
        self
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn plan(&self) -> SweepPlan {
        enumerate(&self.parameters)
    }

    /// Driver: builds the submission but holds it back, unvalidated, until
    /// the command line is parsed, so `--help` and usage errors never depend
    /// on the script. Worker: binds this task's configuration as defaults.
    pub fn prepare<S: Submitter>(self, launcher: &Launcher<S>) -> Result<PreparedCommand> {
        let sweep = self.plan();
        let swept = sweep.axes.clone();
        let state = if launcher.context().is_worker() {
            let index = launcher.context().array_index()?;
            let configuration = sweep.select(index)?;
            debug!(index, digest = %sweep.digest(), ?configuration, "bound command configuration");
            Prepared::Bound(configuration)
        } else {
            let (submission, target) = launcher
                .pending_submission(self.scheduler_options, Some(sweep.array_len()))?;
            Prepared::Deferred { submission, target }
        };
        let mut command = self.command;
        if let Prepared::Bound(configuration) = &state {
            for (name, value) in &configuration.assignments {
                let value = value.clone();
                command = command.mut_arg(name, |arg| arg.default_value(value));
            }
        }
        Ok(PreparedCommand {
            command,
            swept,
            state,
        })
    }

    /// Runs the full protocol against the process environment and command
    /// line. The driver never returns; a worker gets its parsed arguments.
    pub fn launch(self) -> Result<ArgMatches> {
        let launcher = Launcher::from_env();
        let prepared = self.prepare(&launcher)?;
        let outcome = match prepared.run(&launcher, std::env::args_os()) {
            Err(LaunchError::Parse(err)) => err.exit(),
            other => other?,
        };
        Ok(outcome.terminate_if_submitted())
    }
}

enum Prepared {
    Deferred {
        submission: Submission,
        target: LaunchTarget,
    },
    Bound(Configuration),
}

/// What a parsed invocation should do next.
#[derive(Debug)]
pub enum Invocation {
    Submit(Submission),
    Run(ArgMatches),
}

pub struct PreparedCommand {
    command: Command,
    swept: Vec<String>,
    state: Prepared,
}

impl PreparedCommand {
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Configuration bound in a worker; `None` in the driver.
    pub fn bound(&self) -> Option<&Configuration> {
        match &self.state {
            Prepared::Bound(configuration) => Some(configuration),
            Prepared::Deferred { .. } => None,
        }
    }

    pub fn try_get_matches_from<I, T>(self, args: I) -> Result<Invocation>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command.clone().try_get_matches_from(args)?;
        match self.state {
            Prepared::Deferred {
                mut submission,
                target,
            } => {
                target.validate()?;
                let forwarded = forward_matches(&self.command, &matches, &self.swept);
                debug!(?forwarded, "forwarding parsed arguments");
                submission.forward(forwarded);
                Ok(Invocation::Submit(submission))
            }
            Prepared::Bound(_) => Ok(Invocation::Run(matches)),
        }
    }

    pub fn run<S, I, T>(self, launcher: &Launcher<S>, args: I) -> Result<LaunchOutcome<ArgMatches>>
    where
        S: Submitter,
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match self.try_get_matches_from(args)? {
            Invocation::Submit(submission) => launcher.execute(LaunchPlan::Submit(submission)),
            Invocation::Run(matches) => Ok(LaunchOutcome::Run(matches)),
        }
    }
}

/// Wraps `command` so its swept arguments become a job array submitted with
/// the given scheduler options.
pub fn command<I, K, V>(command: Command, scheduler_options: I) -> SweepCommand
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<OptionValue>,
{
    scheduler_options
        .into_iter()
        .fold(SweepCommand::new(command), |cmd, (name, value)| {
            cmd.scheduler_option(name, value)
        })
}
