//! Conversion between option values and scheduler/command-line flags.

use std::fmt;

use clap::{ArgAction, ArgMatches, Command};

/// A value to be rendered as a command-line flag.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Text(String),
    /// A switch: `true` renders as a bare `--name`, `false` is omitted.
    Flag(bool),
    Absent,
}

impl OptionValue {
    /// Unset values never reach the command line.
    pub fn is_empty(&self) -> bool {
        match self {
            OptionValue::Text(s) => s.is_empty(),
            OptionValue::Flag(on) => !on,
            OptionValue::Absent => true,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Text(s) => f.write_str(s),
            OptionValue::Flag(on) => write!(f, "{}", on),
            OptionValue::Absent => Ok(()),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Flag(value)
    }
}

macro_rules! numeric_option_value {
    ($($t:ty),*) => {
        $(impl From<$t> for OptionValue {
            fn from(value: $t) -> Self {
                OptionValue::Text(value.to_string())
            }
        })*
    };
}

numeric_option_value!(i32, i64, u32, u64, usize, f32, f64);

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(OptionValue::Absent)
    }
}

pub fn flag_name(name: &str) -> String {
    format!("--{}", name.replace('_', "-"))
}

/// Renders `(name, value)` pairs as `--name value` tokens in input order,
/// skipping empty values.
pub fn encode_options<I, K, V>(options: I) -> Vec<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<OptionValue>,
{
    let mut args = Vec::new();
    for (name, value) in options {
        let value = value.into();
        if value.is_empty() {
            continue;
        }
        args.push(flag_name(name.as_ref()));
        if let OptionValue::Text(text) = value {
            args.push(text);
        }
    }
    args
}

/// Turns the arguments parsed by `command` back into flags so another
/// invocation of the same program sees the same values. Arguments whose id is
/// in `skip` are left out, as are help/version and empty values.
pub fn forward_matches(command: &Command, matches: &ArgMatches, skip: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    for arg in command.get_arguments() {
        let id = arg.get_id().as_str();
        if skip.iter().any(|s| s == id) {
            continue;
        }
        let name = match (arg.get_long(), arg.get_short()) {
            (Some(long), _) => format!("--{}", long),
            (None, Some(short)) => format!("-{}", short),
            (None, None) => flag_name(id),
        };
        match arg.get_action() {
            ArgAction::Help
            | ArgAction::HelpShort
            | ArgAction::HelpLong
            | ArgAction::Version => {}
            ArgAction::SetTrue => {
                if matches.get_flag(id) {
                    args.push(name);
                }
            }
            ArgAction::Count => {
                for _ in 0..matches.get_count(id) {
                    args.push(name.clone());
                }
            }
            // SetFalse switches are on by default; only an explicit off state
            // needs forwarding.
            ArgAction::SetFalse => {
                if !matches.get_flag(id) {
                    args.push(name);
                }
            }
            _ => {
                let Some(raw) = matches.get_raw(id) else {
                    continue;
                };
                let positional = arg.is_positional();
                for value in raw {
                    let value = value.to_string_lossy();
                    if value.is_empty() {
                        continue;
                    }
                    if !positional {
                        args.push(name.clone());
                    }
                    args.push(value.into_owned());
                }
            }
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Arg;
    use std::collections::BTreeMap;

    #[test]
    fn encodes_pairs_with_hyphenated_names() {
        let args = encode_options(vec![
            ("time", OptionValue::from("01:00:00")),
            ("cpus_per_task", OptionValue::from(4u32)),
        ]);
        assert_eq!(args, vec!["--time", "01:00:00", "--cpus-per-task", "4"]);
    }

    #[test]
    fn omits_empty_values() {
        let args = encode_options(vec![
            ("partition", OptionValue::from("")),
            ("account", OptionValue::from(None::<String>)),
            ("exclusive", OptionValue::from(false)),
            ("mem", OptionValue::from("4G")),
        ]);
        assert_eq!(args, vec!["--mem", "4G"]);
    }

    #[test]
    fn zero_is_a_value() {
        let args = encode_options([("seed", 0i64)]);
        assert_eq!(args, vec!["--seed", "0"]);
    }

    #[test]
    fn true_switch_is_a_single_token() {
        let args = encode_options([("exclusive", true)]);
        assert_eq!(args, vec!["--exclusive"]);
    }

    #[test]
    fn order_follows_ordered_map() {
        let mut options = BTreeMap::new();
        options.insert("time", "10");
        options.insert("mem", "1G");
        options.insert("job_name", "sweep");
        assert_eq!(
            encode_options(options),
            vec!["--job-name", "sweep", "--mem", "1G", "--time", "10"]
        );
    }

    fn sample_command() -> Command {
        Command::new("train")
            .arg(Arg::new("dataset"))
            .arg(Arg::new("epochs").long("epochs"))
            .arg(Arg::new("learning_rate").long("learning-rate"))
            .arg(Arg::new("mode").long("mode"))
            .arg(Arg::new("tags").long("tag").action(ArgAction::Append))
            .arg(Arg::new("dry_run").long("dry-run").action(ArgAction::SetTrue))
            .arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::Count))
    }

    #[test]
    fn forwards_parsed_values_in_declaration_order() {
        let command = sample_command();
        let matches = command
            .clone()
            .try_get_matches_from([
                "train", "--mode", "eval", "--epochs", "5", "cifar", "--tag", "a", "--tag", "b",
                "-vv",
            ])
            .expect("parse");
        let args = forward_matches(&command, &matches, &["mode".to_string()]);
        assert_eq!(
            args,
            vec![
                "cifar", "--epochs", "5", "--tag", "a", "--tag", "b", "--verbose", "--verbose"
            ]
        );
    }

    #[test]
    fn short_only_options_replay_through_the_same_command() {
        let command = Command::new("train")
            .arg(Arg::new("n").short('n'))
            .arg(Arg::new("quiet").short('q').action(ArgAction::SetTrue));
        let matches = command
            .clone()
            .try_get_matches_from(["train", "-n", "5", "-q"])
            .expect("parse");
        let args = forward_matches(&command, &matches, &[]);
        assert_eq!(args, vec!["-n", "5", "-q"]);

        let replayed = command
            .clone()
            .try_get_matches_from(std::iter::once("train".to_string()).chain(args))
            .expect("worker parse of forwarded flags");
        assert_eq!(replayed.get_one::<String>("n").map(String::as_str), Some("5"));
        assert!(replayed.get_flag("quiet"));
    }

    #[test]
    fn unset_and_false_values_are_not_forwarded() {
        let command = sample_command();
        let matches = command
            .clone()
            .try_get_matches_from(["train", "--learning-rate", "", "--dry-run"])
            .expect("parse");
        let args = forward_matches(&command, &matches, &[]);
        assert_eq!(args, vec!["--dry-run"]);
    }
}
