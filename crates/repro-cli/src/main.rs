mod store;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use repro_launch::{enumerate, Parameter, SweepPlan};
use serde_json::{json, Value};
use std::io::{self, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "repro", version, about = "Reproducible experiment store and sweep planner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the project layout and a git repository in the current directory.
    Init,
    /// Archive stdin under store/<tag>/, named after the current commit.
    Store {
        tag: String,
        #[arg(long)]
        tee: bool,
    },
    /// Print stored entries for a commit (or `all`).
    Load {
        commit_spec: String,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, short = 'r')]
        raw: bool,
        /// Skip entries recorded from a dirty tree.
        #[arg(long)]
        clean: bool,
    },
    /// Show the configurations a sweep would submit.
    Plan {
        /// Swept parameter as name=value1,value2,...
        #[arg(long = "param")]
        params: Vec<String>,
        /// Parameter forwarded unchanged to every task, as name or name=value.
        #[arg(long = "fixed")]
        fixed: Vec<String>,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(Some(payload)) => emit_json(&payload),
        Ok(None) => {}
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
            } else {
                eprintln!("Error: {:#}", err);
            }
            std::process::exit(1);
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Init => {
            let root = std::env::current_dir()?;
            for path in store::init_project(&root)? {
                let show = path.strip_prefix(&root).unwrap_or(&path).display();
                println!("created: {}", show);
            }
        }
        Commands::Store { tag, tee } => {
            let root = store::find_project_root(&std::env::current_dir()?)?;
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            let echo = if tee { Some(&mut stdout) } else { None };
            let entry = store::store_output(&root, &tag, BufReader::new(stdin.lock()), echo)?;
            if entry.dirty {
                return Err(anyhow!("git dirty, saved as {}", entry.relative));
            }
        }
        Commands::Load {
            commit_spec,
            tag,
            raw,
            clean,
        } => {
            let root = store::find_project_root(&std::env::current_dir()?)?;
            let commit = if commit_spec == "all" {
                None
            } else {
                Some(store::resolve_commit(&root, &commit_spec)?)
            };
            let filter = store::LoadFilter {
                tag,
                commit,
                raw,
                exclude_dirty: clean,
            };
            store::load_entries(&root, &filter, &mut io::stdout().lock())?;
        }
        Commands::Plan {
            params,
            fixed,
            json,
        } => {
            let parameters = parse_parameters(&params, &fixed)?;
            let plan = enumerate(&parameters);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "plan",
                    "plan": plan_to_json(&plan, &parameters),
                })));
            }
            print_plan(&plan, &parameters);
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Plan { json, .. } => *json,
        _ => false,
    }
}

fn parse_parameters(swept: &[String], fixed: &[String]) -> Result<Vec<Parameter>> {
    let mut out = Vec::new();
    for raw in swept {
        let (name, values) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --param '{}': expected name=v1,v2", raw))?;
        if name.trim().is_empty() {
            return Err(anyhow!("invalid --param '{}': name cannot be empty", raw));
        }
        let values: Vec<&str> = values.split(',').filter(|v| !v.is_empty()).collect();
        if values.is_empty() {
            return Err(anyhow!("invalid --param '{}': no values", raw));
        }
        out.push(Parameter::swept(name.trim(), values));
    }
    for raw in fixed {
        let parameter = match raw.split_once('=') {
            Some((name, value)) => Parameter::fixed_with(name.trim(), value),
            None => Parameter::fixed(raw.trim()),
        };
        if parameter.name().is_empty() {
            return Err(anyhow!("invalid --fixed '{}': name cannot be empty", raw));
        }
        out.push(parameter);
    }
    Ok(out)
}

/// Fixed parameters as `(name, value)`, in declaration order.
fn fixed_values(parameters: &[Parameter]) -> Vec<(&str, Option<&str>)> {
    parameters
        .iter()
        .filter_map(|p| match p {
            Parameter::Fixed { name, value } => Some((name.as_str(), value.as_deref())),
            Parameter::Swept { .. } => None,
        })
        .collect()
}

fn plan_to_json(plan: &SweepPlan, parameters: &[Parameter]) -> Value {
    let configurations: Vec<Value> = plan
        .configurations
        .iter()
        .enumerate()
        .map(|(index, c)| {
            let assignments: serde_json::Map<String, Value> = c
                .assignments
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            json!({ "index": index, "assignments": assignments })
        })
        .collect();
    let fixed: Vec<Value> = fixed_values(parameters)
        .into_iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    json!({
        "axes": plan.axes,
        "fixed": fixed,
        "array_len": plan.array_len(),
        "digest": plan.digest(),
        "configurations": configurations,
    })
}

fn print_plan(plan: &SweepPlan, parameters: &[Parameter]) {
    println!("axes: {}", plan.axes.join(", "));
    let fixed: Vec<String> = fixed_values(parameters)
        .into_iter()
        .map(|(name, value)| match value {
            Some(value) => format!("{}={}", name, value),
            None => name.to_string(),
        })
        .collect();
    if !fixed.is_empty() {
        println!("fixed: {}", fixed.join(" "));
    }
    println!("array: 0-{}", plan.array_len().saturating_sub(1));
    println!("digest: {}", plan.digest());
    for (index, c) in plan.configurations.iter().enumerate() {
        let pairs: Vec<String> = c
            .assignments
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!("{}: {}", index, pairs.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_parameters_keeps_declaration_order() {
        let params = parse_parameters(
            &["mode=train,eval".to_string(), "lr=0.1,0.01".to_string()],
            &["epochs".to_string(), "seed=0".to_string()],
        )
        .expect("parse");
        assert_eq!(
            params,
            vec![
                Parameter::swept("mode", ["train", "eval"]),
                Parameter::swept("lr", ["0.1", "0.01"]),
                Parameter::fixed("epochs"),
                Parameter::fixed_with("seed", "0"),
            ]
        );
    }

    #[test]
    fn parse_parameters_rejects_malformed_input() {
        assert!(parse_parameters(&["mode".to_string()], &[]).is_err());
        assert!(parse_parameters(&["=a,b".to_string()], &[]).is_err());
        assert!(parse_parameters(&["mode=".to_string()], &[]).is_err());
        assert!(parse_parameters(&[], &["=5".to_string()]).is_err());
    }

    #[test]
    fn plan_json_lists_indexed_configurations() {
        let parameters = [
            Parameter::swept("mode", ["train", "eval"]),
            Parameter::fixed_with("epochs", "10"),
            Parameter::fixed("dataset"),
        ];
        let plan = enumerate(&parameters);
        let value = plan_to_json(&plan, &parameters);
        assert_eq!(
            value["fixed"],
            json!([{ "name": "epochs", "value": "10" }, { "name": "dataset", "value": null }])
        );
        assert_eq!(value["array_len"], json!(2));
        assert_eq!(value["configurations"][1]["assignments"]["mode"], json!("eval"));
        assert_eq!(value["configurations"][1]["index"], json!(1));
    }

    #[test]
    fn json_error_shape() {
        let v = json_error("command_failed", "boom".to_string(), json!({}));
        assert_eq!(v["ok"], json!(false));
        assert_eq!(v["error"]["code"], json!("command_failed"));
    }
}
