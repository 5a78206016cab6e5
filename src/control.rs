// src/control.rs

//! Line-based control loop.
//!
//! While the monitor prints output, the user can type commands on stdin:
//!
//! - `stop <id>` (or `s <id>`)
//! - `restart <id>` (or `r <id>`)
//! - `add <command line>` (or `+ <command line>`)
//! - `list` (or `l`)
//! - `quit` (or `q`): stops every command
//! - `help` (or `?`)
//!
//! Lines arrive over a channel, fed by a dedicated thread reading the
//! terminal, so a blocked read never holds up the runtime.

use std::io::{self, BufRead, Write};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::exec::{CommandView, Executor, StopOutcome};

const HELP: &str = "commands: stop <id> | restart <id> | add <command> | list | quit";

/// One parsed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Stop(String),
    Restart(String),
    Add(String),
    List,
    Quit,
    Help,
}

/// Parse a control line. Blank lines give `Ok(None)`.
pub fn parse_control_line(line: &str) -> Result<Option<ControlCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let needs_arg = |what: &str| {
        if rest.is_empty() {
            Err(format!("'{verb}' needs {what}"))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match verb {
        "stop" | "s" => ControlCommand::Stop(needs_arg("a command id")?),
        "restart" | "r" => ControlCommand::Restart(needs_arg("a command id")?),
        "add" | "+" => ControlCommand::Add(needs_arg("a command line")?),
        "list" | "l" => ControlCommand::List,
        "quit" | "q" | "exit" => ControlCommand::Quit,
        "help" | "?" => ControlCommand::Help,
        other => return Err(format!("unknown command '{other}' ({HELP})")),
    };
    Ok(Some(command))
}

/// Apply control lines to `executor` until the channel closes or `quit`.
///
/// Replies and errors are written to `out`; a failing command never ends
/// the loop. `quit` shuts the executor down before returning.
pub async fn control_loop<W: Write>(
    executor: &Executor,
    mut lines: mpsc::Receiver<String>,
    out: &mut W,
) -> io::Result<()> {
    while let Some(line) = lines.recv().await {
        let command = match parse_control_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                writeln!(out, "error: {msg}")?;
                continue;
            }
        };
        debug!(?command, "control command");

        match command {
            ControlCommand::Stop(id) => match executor.stop(&id).await {
                Ok(StopOutcome::Stopped) => writeln!(out, "stopped {id}")?,
                Ok(StopOutcome::AlreadyTerminal(status)) => {
                    writeln!(out, "{id} already {status}")?
                }
                Err(e) => writeln!(out, "error: {e}")?,
            },
            ControlCommand::Restart(id) => match executor.restart(&id).await {
                Ok(()) => writeln!(out, "restarted {id}")?,
                Err(e) => writeln!(out, "error: {e}")?,
            },
            ControlCommand::Add(command_line) => match executor.submit([command_line]) {
                Ok(ids) => writeln!(out, "added {}", ids.join(", "))?,
                Err(e) => writeln!(out, "error: {e}")?,
            },
            ControlCommand::List => {
                let mut views: Vec<CommandView> = executor.snapshot().into_values().collect();
                views.sort_by_key(|v| v.seq);
                for view in views {
                    writeln!(
                        out,
                        "{} {} {} ({})",
                        view.status.marker(),
                        view.id,
                        view.status,
                        view.name
                    )?;
                }
            }
            ControlCommand::Help => writeln!(out, "{HELP}")?,
            ControlCommand::Quit => {
                info!("quit requested; stopping all commands");
                executor.shutdown().await;
                writeln!(out, "all commands stopped")?;
                out.flush()?;
                return Ok(());
            }
        }
        out.flush()?;
    }
    Ok(())
}

/// Forward stdin lines into a channel from a dedicated thread.
///
/// The thread ends at EOF, on a read error, or once the receiver is gone.
pub fn spawn_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
