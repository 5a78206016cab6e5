// tests/cli_resolution.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tempfile::NamedTempFile;

use cmdpool::cli::{CliArgs, LogLevel};
use cmdpool::errors::CmdpoolError;
use cmdpool::{print_dry_run, resolve_plan, write_default_config};

type TestResult = Result<(), Box<dyn Error>>;

fn args(argv: &[&str]) -> CliArgs {
    CliArgs::try_parse_from(std::iter::once("cmdpool").chain(argv.iter().copied()))
        .expect("arguments should parse")
}

fn config_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[global]
max_output_lines = 42
refresh_rate_ms = 250

[commands.b_second]
commands = ["echo b"]

[commands.a_first]
commands = ["echo a0", "echo a1"]
dir = "sub"
"#
    )
    .unwrap();
    file
}

#[test]
fn flag_commands_win_over_positional_ones() -> TestResult {
    init_tracing();
    let plan = resolve_plan(&args(&["-e", "echo a", "--command", "echo b", "echo c"]))?;

    let lines: Vec<&str> = plan.specs.iter().map(|s| s.command_line.as_str()).collect();
    assert_eq!(lines, vec!["echo a", "echo b"]);
    assert_eq!(plan.specs[0].id, "cmd_0");
    assert_eq!(plan.specs[1].id, "cmd_1");
    Ok(())
}

#[test]
fn positional_commands_pick_up_dir_and_auto_restart() -> TestResult {
    let plan = resolve_plan(&args(&["-C", "/tmp", "--auto-restart", "sleep 1", "echo x"]))?;

    assert_eq!(plan.specs.len(), 2);
    for spec in &plan.specs {
        assert_eq!(spec.working_dir, PathBuf::from("/tmp"));
        assert!(spec.auto_restart);
    }
    assert_eq!(plan.executor.default_dir, PathBuf::from("/tmp"));
    assert_eq!(plan.executor.max_output_lines, 1000);
    assert_eq!(plan.monitor.refresh, Duration::from_millis(100));
    Ok(())
}

#[test]
fn config_sets_are_used_when_no_commands_given() -> TestResult {
    let file = config_file();
    let path = file.path().to_str().unwrap();

    let all = resolve_plan(&args(&["-c", path]))?;
    let ids: Vec<&str> = all.specs.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a_first_0", "a_first_1", "b_second_0"]);
    assert_eq!(
        all.specs[0].working_dir,
        file.path().parent().unwrap().join("sub")
    );
    assert_eq!(all.executor.max_output_lines, 42);
    assert_eq!(all.monitor.refresh, Duration::from_millis(250));

    let one = resolve_plan(&args(&["-c", path, "-s", "b_second"]))?;
    assert_eq!(one.specs.len(), 1);
    assert_eq!(one.specs[0].command_line, "echo b");
    Ok(())
}

#[test]
fn cli_commands_override_config_sets_but_keep_its_globals() -> TestResult {
    let file = config_file();
    let path = file.path().to_str().unwrap();

    let plan = resolve_plan(&args(&["-c", path, "--refresh-ms", "10", "echo direct"]))?;
    assert_eq!(plan.specs.len(), 1);
    assert_eq!(plan.specs[0].id, "cmd_0");
    assert_eq!(plan.executor.max_output_lines, 42);
    assert_eq!(plan.monitor.refresh, Duration::from_millis(10));

    let plan = resolve_plan(&args(&["-c", path, "--max-output-lines", "7"]))?;
    assert_eq!(plan.executor.max_output_lines, 7);
    Ok(())
}

#[test]
fn unknown_set_and_empty_plan_are_errors() {
    let file = config_file();
    let path = file.path().to_str().unwrap();

    assert!(matches!(
        resolve_plan(&args(&["-c", path, "-s", "missing"])),
        Err(CmdpoolError::CommandSetNotFound(name)) if name == "missing"
    ));
    assert!(matches!(
        resolve_plan(&args(&[])),
        Err(CmdpoolError::NoCommands)
    ));
}

#[test]
fn invalid_numeric_flags_are_rejected_by_clap() {
    let argv = ["cmdpool", "--max-output-lines", "0", "echo x"];
    assert!(CliArgs::try_parse_from(argv).is_err());
    let argv = ["cmdpool", "--set", "web"];
    assert!(CliArgs::try_parse_from(argv).is_err(), "--set requires --config");
}

#[test]
fn log_level_flag_parses() {
    let parsed = args(&["--log-level", "debug", "echo x"]);
    assert_eq!(parsed.log_level, Some(LogLevel::Debug));
    assert_eq!(parsed.tail, 20);
    assert!(!parsed.dry_run);
    assert!(!parsed.no_input);
}

#[test]
fn no_input_disables_the_control_loop() -> TestResult {
    assert!(resolve_plan(&args(&["echo x"]))?.control);
    assert!(!resolve_plan(&args(&["--no-input", "echo x"]))?.control);
    Ok(())
}

#[test]
fn dry_run_lists_every_resolved_command() -> TestResult {
    let plan = resolve_plan(&args(&["--dry-run", "-e", "echo \"a b\"", "-e", "sleep 1"]))?;

    let mut out = Vec::new();
    print_dry_run(&plan, &mut out)?;
    let text = String::from_utf8(out)?;

    assert!(text.starts_with("cmdpool dry-run\n"));
    assert!(text.contains("commands (2):"));
    assert!(text.contains("  - cmd_0\n      cmd: echo \"a b\"\n"));
    assert!(text.contains("  - cmd_1\n      cmd: sleep 1\n"));
    Ok(())
}

#[test]
fn init_config_writes_a_loadable_file() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cmdpool.toml");

    write_default_config(&path)?;

    let plan = resolve_plan(&args(&["-c", path.to_str().unwrap()]))?;
    assert_eq!(plan.specs.len(), 2);
    assert_eq!(plan.specs[0].id, "example_0");
    assert_eq!(plan.specs[0].working_dir, dir.path().join("."));
    assert_eq!(plan.log_file, Some(PathBuf::from("cmdpool.log")));
    Ok(())
}
