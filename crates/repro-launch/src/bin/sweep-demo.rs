//! Minimal program on top of the process-level entry points. `REPRO_DEMO`
//! picks `simple`, `multi` or, when unset, the declarative command.

use clap::{Arg, Command};
use repro_launch::LaunchError;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(err.exit_code());
    }
}

fn run() -> Result<(), LaunchError> {
    let options = [("job-name", "sweep-demo")];
    match std::env::var("REPRO_DEMO").unwrap_or_default().as_str() {
        "simple" => {
            repro_launch::simple(options)?;
            println!("simple task ran");
        }
        "multi" => {
            let item = repro_launch::multi(["alpha", "beta", "gamma"], options)?;
            println!("multi task ran with {}", item);
        }
        _ => {
            let matches = repro_launch::command(Command::new("sweep-demo"), options)
                .swept(Arg::new("mode").long("mode"), ["train", "eval"])
                .fixed(Arg::new("epochs").long("epochs").default_value("1"))
                .launch()?;
            let value = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();
            println!("command task ran with mode={} epochs={}", value("mode"), value("epochs"));
        }
    }
    Ok(())
}
