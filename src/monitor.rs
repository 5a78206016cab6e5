// src/monitor.rs

//! Plain-text monitor.
//!
//! Polls a [`CommandSource`] on a fixed interval, prints output lines that
//! appeared since the previous poll and, once every command has settled,
//! prints a final report and returns a [`RunSummary`].

use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Duration;

use tracing::debug;

use crate::exec::{CommandView, Executor, Snapshot};
use crate::types::{CommandId, CommandStatus};

/// Anything that can produce a consistent snapshot of supervised commands.
pub trait CommandSource {
    fn snapshot(&self) -> Snapshot;
}

impl CommandSource for Executor {
    fn snapshot(&self) -> Snapshot {
        Executor::snapshot(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Polling interval.
    pub refresh: Duration,
    /// Most lines printed per command per poll; older new lines are skipped.
    pub tail: usize,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            refresh: Duration::from_millis(100),
            tail: 20,
        }
    }
}

/// Final tally of terminal states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub done: usize,
    pub failed: usize,
    pub stopped: usize,
}

impl RunSummary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut summary = Self::default();
        for view in snapshot.values() {
            match view.status {
                CommandStatus::Done => summary.done += 1,
                CommandStatus::Failed => summary.failed += 1,
                CommandStatus::Stopped => summary.stopped += 1,
                CommandStatus::Pending | CommandStatus::Running => {}
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// What has already been printed for one command.
#[derive(Debug, Clone, Copy)]
struct Seen {
    run: u64,
    lines: u64,
    status: CommandStatus,
}

/// A command is settled when it is terminal and no automatic relaunch is due.
pub fn is_settled(view: &CommandView) -> bool {
    view.status.is_terminal() && !view.restart_pending
}

/// Watch `source` until every command has settled.
pub async fn monitor<S, W>(source: &S, options: &MonitorOptions, out: &mut W) -> io::Result<RunSummary>
where
    S: CommandSource + ?Sized,
    W: Write,
{
    let mut seen: HashMap<CommandId, Seen> = HashMap::new();
    let mut ticker = tokio::time::interval(options.refresh);

    loop {
        ticker.tick().await;
        let snapshot = source.snapshot();

        let mut views: Vec<&CommandView> = snapshot.values().collect();
        views.sort_by_key(|v| v.seq);
        for view in views {
            print_updates(view, seen.get(&view.id).copied(), options.tail, out)?;
            seen.insert(
                view.id.clone(),
                Seen {
                    run: view.run,
                    lines: view.total_lines,
                    status: view.status,
                },
            );
        }
        out.flush()?;

        if snapshot.values().all(is_settled) {
            debug!(commands = snapshot.len(), "all commands settled");
            print_final(&snapshot, out)?;
            return Ok(RunSummary::from_snapshot(&snapshot));
        }
    }
}

fn print_updates<W: Write>(
    view: &CommandView,
    previous: Option<Seen>,
    tail: usize,
    out: &mut W,
) -> io::Result<()> {
    let (printed, status_changed) = match previous {
        Some(prev) if prev.run == view.run && prev.lines <= view.total_lines => {
            (prev.lines, prev.status != view.status)
        }
        _ => (0, true),
    };

    let new_lines = view.total_lines - printed;
    if new_lines == 0 && !status_changed {
        return Ok(());
    }

    writeln!(out, "[{}] {}", view.id, view.status)?;

    let available = view.output.len().min(usize::try_from(new_lines).unwrap_or(usize::MAX));
    let shown = available.min(tail);
    let skipped = new_lines - shown as u64;
    if skipped > 0 {
        writeln!(out, "  ... {skipped} earlier lines not shown")?;
    }
    for line in &view.output[view.output.len() - shown..] {
        writeln!(out, "  {line}")?;
    }
    Ok(())
}

fn print_final<W: Write>(snapshot: &Snapshot, out: &mut W) -> io::Result<()> {
    let mut views: Vec<&CommandView> = snapshot.values().collect();
    views.sort_by_key(|v| v.seq);

    writeln!(out)?;
    writeln!(out, "=== Final Results ===")?;
    for view in views {
        write!(
            out,
            "{} {}: {} ({})",
            view.status.marker(),
            view.id,
            view.status,
            view.name
        )?;
        if let Some(err) = &view.last_error {
            write!(out, " - {err}")?;
        }
        writeln!(out)?;
    }
    out.flush()
}
