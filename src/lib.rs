// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod monitor;
pub mod types;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, GlobalSection, config_base_dir, load_and_validate};
use crate::control::{control_loop, spawn_stdin_lines};
use crate::errors::CmdpoolError;
use crate::exec::{Executor, ExecutorOptions, LaunchSpec};
use crate::monitor::{MonitorOptions, RunSummary, monitor};

/// Everything resolved from the CLI and the config file before any process
/// is started.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub specs: Vec<LaunchSpec>,
    pub executor: ExecutorOptions,
    pub monitor: MonitorOptions,
    pub log_file: Option<PathBuf>,
    /// Read control commands (`stop`, `restart`, `add`, `quit`) from stdin.
    pub control: bool,
}

/// Resolve which commands to run and with which settings.
///
/// Command sources, first non-empty wins:
/// 1. `-e/--command` flags
/// 2. positional commands
/// 3. the config file (`--set` picks one set, otherwise every set by name)
pub fn resolve_plan(args: &CliArgs) -> errors::Result<RunPlan> {
    let config = match &args.config {
        Some(path) => Some((load_and_validate(path)?, config_base_dir(path))),
        None => None,
    };

    let global = config
        .as_ref()
        .map(|(cfg, _)| cfg.global.clone())
        .unwrap_or_default();
    let cli_dir = args.dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let cli_commands = if !args.command.is_empty() {
        &args.command
    } else {
        &args.commands
    };

    let specs = if !cli_commands.is_empty() {
        cli_commands
            .iter()
            .enumerate()
            .map(|(i, line)| {
                LaunchSpec::new(format!("cmd_{i}"), line.clone())
                    .dir(cli_dir.clone())
                    .auto_restart(args.auto_restart)
            })
            .collect()
    } else if let Some((cfg, base_dir)) = &config {
        cfg.launch_specs(args.set.as_deref(), base_dir)?
    } else {
        Vec::new()
    };

    if specs.is_empty() {
        return Err(CmdpoolError::NoCommands);
    }

    Ok(RunPlan {
        specs,
        executor: executor_options(&global, args, cli_dir),
        monitor: MonitorOptions {
            refresh: args
                .refresh_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| global.refresh_interval()),
            tail: args.tail,
        },
        log_file: global.log_file,
        control: !args.no_input,
    })
}

fn executor_options(global: &GlobalSection, args: &CliArgs, default_dir: PathBuf) -> ExecutorOptions {
    let mut options = global.executor_options(default_dir);
    if let Some(n) = args.max_output_lines {
        options.max_output_lines = usize::try_from(n).unwrap_or(usize::MAX);
    }
    options
}

/// Write the starter configuration used by `--init-config`.
pub fn write_default_config(path: &Path) -> errors::Result<()> {
    config::save(&ConfigFile::default_config(), path)?;
    info!(path = %path.display(), "wrote default config");
    Ok(())
}

/// Dry-run output: print the resolved commands and settings.
pub fn print_dry_run<W: Write>(plan: &RunPlan, out: &mut W) -> io::Result<()> {
    writeln!(out, "cmdpool dry-run")?;
    writeln!(out, "  max_output_lines = {}", plan.executor.max_output_lines)?;
    writeln!(out, "  refresh = {}ms", plan.monitor.refresh.as_millis())?;
    writeln!(out)?;

    writeln!(out, "commands ({}):", plan.specs.len())?;
    for spec in &plan.specs {
        writeln!(out, "  - {}", spec.id)?;
        writeln!(out, "      cmd: {}", spec.command_line)?;
        writeln!(out, "      dir: {}", spec.working_dir.display())?;
        if let Some(name) = &spec.name {
            writeln!(out, "      name: {name}")?;
        }
        if spec.auto_restart {
            writeln!(out, "      auto_restart: true")?;
        }
        for (key, value) in &spec.env {
            writeln!(out, "      env: {key}={value}")?;
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

/// Launch every command of `plan`, monitor them on stdout until they settle,
/// and return the tally.
///
/// Ctrl-C or `quit` on stdin shuts the executor down; the monitor then
/// reports the stopped commands and returns normally.
pub async fn run(plan: RunPlan) -> Result<RunSummary> {
    let executor = Executor::new(plan.executor);

    for spec in plan.specs {
        executor.launch(spec)?;
    }
    info!(commands = executor.len(), "all commands launched");

    let ctrl_c = {
        let executor = executor.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; stopping all commands");
            executor.shutdown().await;
        })
    };

    let control = plan.control.then(|| {
        let executor = executor.clone();
        let lines = spawn_stdin_lines();
        tokio::spawn(async move {
            let mut out = io::stdout();
            if let Err(e) = control_loop(&executor, lines, &mut out).await {
                warn!(error = %e, "control loop stopped");
            }
        })
    });

    let mut out = io::stdout();
    let summary = monitor(&executor, &plan.monitor, &mut out).await;

    ctrl_c.abort();
    if let Some(control) = control {
        control.abort();
    }
    executor.shutdown().await;

    let summary = summary?;
    info!(
        done = summary.done,
        failed = summary.failed,
        stopped = summary.stopped,
        "run finished"
    );
    Ok(summary)
}
