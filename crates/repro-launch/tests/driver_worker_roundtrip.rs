use std::fs;
use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command};
use repro_launch::{
    command, InvocationContext, LaunchOutcome, LaunchTarget, Launcher, LauncherConfig,
    RecordingSubmitter, SweepCommand,
};

fn experiment() -> SweepCommand {
    command(Command::new("experiment"), [("partition", "gpu")])
        .swept(Arg::new("mode").long("mode"), ["train", "eval"])
        .fixed(Arg::new("epochs").long("epochs"))
}

fn scratch_script() -> (PathBuf, LaunchTarget) {
    let dir = std::env::temp_dir().join(format!(
        "repro_roundtrip_{}_{}",
        std::process::id(),
        chrono::Utc::now().timestamp_micros()
    ));
    fs::create_dir_all(&dir).expect("scratch dir");
    let script = dir.join("experiment");
    fs::write(&script, "#!/opt/bin/runner\nmain\n").expect("script");
    (dir, LaunchTarget::new(script, "/opt/bin/runner"))
}

fn run_worker(index: usize, argv: &[String]) -> ArgMatches {
    let launcher = Launcher::new(LauncherConfig::default(), InvocationContext::worker("100", index))
        .with_submitter(RecordingSubmitter::default());
    let prepared = experiment().prepare(&launcher).expect("prepare worker");
    match prepared.run(&launcher, argv).expect("worker run") {
        LaunchOutcome::Run(matches) => matches,
        LaunchOutcome::Submitted { .. } => panic!("worker {} submitted instead of running", index),
    }
}

#[test]
fn driver_submission_replays_in_every_worker() {
    let (dir, target) = scratch_script();
    let script = target.script.to_string_lossy().into_owned();

    let driver = Launcher::new(LauncherConfig::default(), InvocationContext::Driver)
        .with_target(target)
        .with_submitter(RecordingSubmitter::default());
    let prepared = experiment().prepare(&driver).expect("prepare driver");
    let outcome = prepared
        .run(&driver, ["experiment", "--epochs", "5"])
        .expect("driver run");
    assert!(outcome.is_submitted());

    let calls = driver.submitter().calls();
    assert_eq!(calls.len(), 1, "exactly one submission");
    let argv = &calls[0];
    assert_eq!(
        argv,
        &vec![
            "sbatch".to_string(),
            "--partition".to_string(),
            "gpu".to_string(),
            "--array=0-1".to_string(),
            "--".to_string(),
            script.clone(),
            "--epochs".to_string(),
            "5".to_string(),
        ]
    );
    assert!(!argv.iter().any(|a| a == "--mode"), "swept values are never forwarded");

    // The scheduler runs `<script> <forwarded...>` once per array index.
    let separator = argv.iter().position(|a| a == "--").expect("separator");
    let worker_argv: Vec<String> = argv[separator + 1..].to_vec();

    for (index, mode) in [(0, "train"), (1, "eval")] {
        let matches = run_worker(index, &worker_argv);
        assert_eq!(matches.get_one::<String>("mode").map(String::as_str), Some(mode));
        assert_eq!(matches.get_one::<String>("epochs").map(String::as_str), Some("5"));
    }

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn every_process_agrees_on_the_plan() {
    let first = experiment().plan();
    let second = experiment().plan();
    assert_eq!(first, second);
    assert_eq!(first.digest(), second.digest());
    assert_eq!(first.array_len(), 2);
}
