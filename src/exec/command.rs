// src/exec/command.rs

//! Per-command state record.
//!
//! A [`Command`] is owned by the executor registry behind a `std::sync::Mutex`
//! and mutated by exactly one runner task plus its two stream readers. Every
//! mutation that originates from a runner carries the `run_id` it was started
//! with; writes from an outdated run (one that has since been reset by a
//! restart) are dropped.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::errors::CommandFailure;
use crate::types::{CommandId, CommandStatus};

/// Default number of lines kept per command.
pub const DEFAULT_MAX_OUTPUT_LINES: usize = 1000;

/// Longest captured line in bytes. Output without a newline is cut into
/// pieces of this size, each stored as its own line.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Bounded FIFO of captured lines. The oldest line is evicted first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    cap: usize,
}

impl OutputBuffer {
    /// A capacity of zero is bumped to one.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            lines: VecDeque::with_capacity(cap.min(DEFAULT_MAX_OUTPUT_LINES)),
            cap,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Reply channel a runner uses to confirm (or reject) a kill request.
pub(crate) type KillReply = oneshot::Sender<io::Result<()>>;

/// Exclusive termination handle for a running process.
///
/// Only present on a [`Command`] while it is `Running`. Taking it out of the
/// record is what grants the right to kill the process; the runner task that
/// owns the child performs the kill, reaps the process, drains its streams
/// and only then answers.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: oneshot::Sender<KillReply>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: Option<u32>, kill_tx: oneshot::Sender<KillReply>) -> Self {
        Self { pid, kill_tx }
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the runner to kill the process and wait until it is reaped.
    pub(crate) async fn kill(self) -> io::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.kill_tx
            .send(reply_tx)
            .map_err(|_| io::Error::other("process already exited"))?;
        reply_rx
            .await
            .map_err(|_| io::Error::other("runner exited before confirming the kill"))?
    }
}

/// Everything needed to register and (re)launch one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub id: CommandId,
    /// Display name; `None` means "use the command line".
    pub name: Option<String>,
    pub command_line: String,
    pub working_dir: PathBuf,
    pub auto_restart: bool,
    /// Extra environment variables for the process.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(id: impl Into<CommandId>, command_line: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            command_line: command_line.into(),
            working_dir: PathBuf::from("."),
            auto_restart: false,
            env: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn auto_restart(mut self, auto_restart: bool) -> Self {
        self.auto_restart = auto_restart;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Point-in-time copy of a command's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandView {
    pub id: CommandId,
    pub name: String,
    pub command_line: String,
    pub working_dir: PathBuf,
    pub status: CommandStatus,
    pub output: Vec<String>,
    /// Lines appended during the current run, including evicted ones.
    pub total_lines: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_error: Option<CommandFailure>,
    pub auto_restart: bool,
    pub restarts: u32,
    /// A failed exit will be followed by an automatic relaunch.
    pub restart_pending: bool,
    /// Bumped on every restart; lets observers tell runs apart.
    pub run: u64,
    pub pid: Option<u32>,
    pub seq: u64,
}

/// Mutable state record for one supervised process.
#[derive(Debug)]
pub struct Command {
    pub(crate) spec: LaunchSpec,
    pub(crate) seq: u64,
    pub(crate) status: CommandStatus,
    pub(crate) output: OutputBuffer,
    pub(crate) total_lines: u64,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<CommandFailure>,
    pub(crate) restarts: u32,
    /// An automatic relaunch is scheduled for the current (failed) run.
    pub(crate) restart_pending: bool,
    pub(crate) run_id: u64,
    pub(crate) handle: Option<ProcessHandle>,
    pub(crate) runner: Option<JoinHandle<()>>,
}

impl Command {
    pub(crate) fn new(spec: LaunchSpec, seq: u64, max_output_lines: usize) -> Self {
        Self {
            spec,
            seq,
            status: CommandStatus::Pending,
            output: OutputBuffer::new(max_output_lines),
            total_lines: 0,
            started_at: Utc::now(),
            ended_at: None,
            last_error: None,
            restarts: 0,
            restart_pending: false,
            run_id: 0,
            handle: None,
            runner: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub(crate) fn is_current(&self, run_id: u64) -> bool {
        self.run_id == run_id
    }

    /// Append a captured line; returns `false` if `run_id` is outdated.
    pub(crate) fn append(&mut self, run_id: u64, line: String) -> bool {
        if !self.is_current(run_id) {
            return false;
        }
        self.output.push(line);
        self.total_lines += 1;
        true
    }

    /// Pending -> Running. Fails if the run was stopped or reset meanwhile.
    pub(crate) fn mark_running(&mut self, run_id: u64, handle: ProcessHandle) -> bool {
        if !self.is_current(run_id) || self.status != CommandStatus::Pending {
            return false;
        }
        self.status = CommandStatus::Running;
        self.started_at = Utc::now();
        self.handle = Some(handle);
        true
    }

    /// Pending -> Failed, used when no process was ever started.
    pub(crate) fn fail_launch(&mut self, run_id: u64, failure: CommandFailure) -> bool {
        if !self.is_current(run_id) || self.status != CommandStatus::Pending {
            return false;
        }
        self.status = CommandStatus::Failed;
        self.last_error = Some(failure);
        self.ended_at = Some(Utc::now());
        true
    }

    /// Running -> Done/Failed after a natural exit.
    ///
    /// Only succeeds while the termination handle is still in place; if a
    /// stop request already took it, the stop wins.
    pub(crate) fn finish_exit(&mut self, run_id: u64, result: Result<(), CommandFailure>) -> bool {
        if !self.is_current(run_id) || self.handle.take().is_none() {
            return false;
        }
        self.ended_at = Some(Utc::now());
        match result {
            Ok(()) => {
                self.status = CommandStatus::Done;
                self.last_error = None;
            }
            Err(failure) => {
                self.status = CommandStatus::Failed;
                self.last_error = Some(failure);
            }
        }
        true
    }

    /// Flag a failed run for automatic relaunch if auto-restart is enabled and
    /// `max_restarts` is not used up yet.
    pub(crate) fn arm_auto_restart(&mut self, max_restarts: u32) -> bool {
        self.restart_pending = self.spec.auto_restart
            && self.status == CommandStatus::Failed
            && self.restarts < max_restarts;
        self.restart_pending
    }

    /// Running -> Stopped on shutdown, when no stop request took the handle.
    pub(crate) fn finish_cancelled(&mut self, run_id: u64) -> bool {
        if !self.is_current(run_id) || self.handle.take().is_none() {
            return false;
        }
        self.status = CommandStatus::Stopped;
        self.ended_at = Some(Utc::now());
        true
    }

    /// Force the record into `Stopped` and hand back the process handle, if any.
    pub(crate) fn mark_stopped(&mut self) -> Option<ProcessHandle> {
        self.status = CommandStatus::Stopped;
        self.last_error = None;
        self.ended_at = Some(Utc::now());
        self.handle.take()
    }

    /// Any state -> Pending for a fresh run with the same command line.
    ///
    /// Returns the new run id.
    pub(crate) fn reset(&mut self) -> u64 {
        self.run_id += 1;
        self.status = CommandStatus::Pending;
        self.output.clear();
        self.total_lines = 0;
        self.last_error = None;
        self.started_at = Utc::now();
        self.ended_at = None;
        self.handle = None;
        self.restart_pending = false;
        self.run_id
    }

    pub fn view(&self) -> CommandView {
        CommandView {
            id: self.spec.id.clone(),
            name: self
                .spec
                .name
                .clone()
                .unwrap_or_else(|| self.spec.command_line.clone()),
            command_line: self.spec.command_line.clone(),
            working_dir: self.spec.working_dir.clone(),
            status: self.status,
            output: self.output.to_vec(),
            total_lines: self.total_lines,
            started_at: self.started_at,
            ended_at: self.ended_at,
            last_error: self.last_error.clone(),
            auto_restart: self.spec.auto_restart,
            restarts: self.restarts,
            restart_pending: self.restart_pending,
            run: self.run_id,
            pid: self.handle.as_ref().and_then(ProcessHandle::pid),
            seq: self.seq,
        }
    }
}
