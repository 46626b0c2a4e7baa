//! Self-scheduling sweep launcher.
//!
//! A program using this crate runs in one of two roles. Started by hand it is
//! the *driver*: it submits itself to the batch scheduler as a job array and
//! exits with the scheduler's status. Started by the scheduler it is a
//! *worker*: it reads its array index, recovers the parameter configuration
//! that index stands for, and runs the experiment with it.
//!
//! ```no_run
//! use clap::Arg;
//!
//! let matches = repro_launch::command(clap::Command::new("train"), [("time", "02:00:00")])
//!     .swept(Arg::new("mode").long("mode"), ["train", "eval"])
//!     .fixed(Arg::new("epochs").long("epochs"))
//!     .launch()?;
//! let mode = matches.get_one::<String>("mode");
//! # Ok::<(), repro_launch::LaunchError>(())
//! ```

pub mod codec;
pub mod command;
pub mod context;
pub mod error;
pub mod launch;
pub mod shebang;
pub mod submit;
pub mod sweep;

pub use codec::{encode_options, forward_matches, OptionValue};
pub use command::{command, Invocation, PreparedCommand, SweepCommand};
pub use context::{InvocationContext, LauncherConfig};
pub use error::{LaunchError, Result};
pub use launch::{LaunchOutcome, LaunchPlan, Launcher};
pub use shebang::{ensure_shebang, LaunchTarget};
pub use submit::{ProcessSubmitter, RecordingSubmitter, Submission, Submitter};
pub use sweep::{enumerate, Configuration, Parameter, SweepPlan};

/// Runs the whole program once as a remote job. The driver submits and
/// exits; in the job this returns and the program carries on.
pub fn simple<I, K, V>(scheduler_options: I) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<OptionValue>,
{
    let outcome = Launcher::from_env().simple(scheduler_options)?;
    outcome.terminate_if_submitted();
    Ok(())
}

/// Submits one array task per element of `items`. The driver exits; each
/// task gets back the element at its array index.
pub fn multi<It, I, K, V>(items: It, scheduler_options: I) -> Result<It::Item>
where
    It: IntoIterator,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<OptionValue>,
{
    let outcome = Launcher::from_env().multi(items, scheduler_options)?;
    Ok(outcome.terminate_if_submitted())
}
