// src/exec/executor.rs

//! Command registry and supervision.
//!
//! The [`Executor`] owns every [`Command`] registered during a session. Each
//! command runs in its own Tokio task (see [`runner`](super::runner)), so
//! commands never wait on each other. Per command there are two locks:
//!
//! - a `std::sync::Mutex<Command>` guarding status, buffer, timestamps, error
//!   and process handle. It is only held for short, non-async sections.
//! - a `tokio::sync::Mutex<()>` control gate, held for the full duration of a
//!   `stop` or `restart` so that two control operations on the same id never
//!   interleave.
//!
//! The id -> entry map sits behind a `RwLock`; inserts take the write side,
//! snapshots iterate under the read side.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ControlError;
use crate::exec::command::{Command, CommandView, DEFAULT_MAX_OUTPUT_LINES, LaunchSpec};
use crate::exec::runner::{RunContext, RunOutcome, run_command};
use crate::types::{CommandId, CommandStatus};

/// How long `restart` waits for the previous runner task to wind down.
const QUIESCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Consistent copy of every registered command, keyed by id.
///
/// Iteration follows string order of the ids, so `cmd_10` comes before
/// `cmd_2`. Sort by [`CommandView::seq`] for launch order.
pub type Snapshot = BTreeMap<CommandId, CommandView>;

/// Executor-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Lines kept per command before the oldest are evicted.
    pub max_output_lines: usize,
    /// Working directory used by [`Executor::submit`].
    pub default_dir: PathBuf,
    /// Automatic relaunches allowed per command after a failed exit.
    pub max_restarts: u32,
    /// Delay before an automatic relaunch.
    pub restart_delay: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
            default_dir: PathBuf::from("."),
            max_restarts: 3,
            restart_delay: Duration::from_millis(1000),
        }
    }
}

/// Result of a successful [`Executor::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The command was pending or running and is now `Stopped`.
    Stopped,
    /// The command had already reached this terminal state; nothing was done.
    AlreadyTerminal(CommandStatus),
}

/// Registry slot for one command.
#[derive(Debug)]
pub(crate) struct CommandEntry {
    state: Mutex<Command>,
    control: tokio::sync::Mutex<()>,
}

impl CommandEntry {
    fn new(command: Command) -> Self {
        Self {
            state: Mutex::new(command),
            control: tokio::sync::Mutex::new(()),
        }
    }

    /// Lock the command record.
    ///
    /// A panic while holding the lock cannot leave the record half-updated in
    /// a way later readers would misinterpret, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Command> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct Inner {
    registry: RwLock<HashMap<CommandId, Arc<CommandEntry>>>,
    options: ExecutorOptions,
    shutdown: CancellationToken,
    next_seq: AtomicU64,
    next_auto_id: AtomicU64,
}

/// Launches, supervises and controls a set of commands.
///
/// Cheap to clone; all clones share the same registry. Methods that launch
/// processes must be called from within a Tokio runtime.
#[derive(Debug, Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

impl Executor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(HashMap::new()),
                options,
                shutdown: CancellationToken::new(),
                next_seq: AtomicU64::new(0),
                next_auto_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.inner.options
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Register and launch one command per string, with ids `cmd_<n>`.
    ///
    /// Returns the assigned ids in input order. Does not wait for any command
    /// to finish.
    pub fn submit<I, S>(&self, command_lines: I) -> Result<Vec<CommandId>, ControlError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids = Vec::new();
        for line in command_lines {
            let line = line.into();
            let entry = loop {
                let n = self.inner.next_auto_id.fetch_add(1, Ordering::Relaxed);
                let spec = LaunchSpec::new(format!("cmd_{n}"), line.clone())
                    .dir(self.inner.options.default_dir.clone());
                match self.register(spec) {
                    Ok(entry) => break entry,
                    Err(ControlError::DuplicateId(taken)) => {
                        debug!(id = %taken, "generated id already taken; trying the next one");
                    }
                    Err(e) => return Err(e),
                }
            };
            ids.push(entry.lock().id().to_string());
            self.start_run(&entry);
        }
        Ok(ids)
    }

    /// Register and launch a single command under a caller-chosen id.
    ///
    /// Ids are never reused: a second `launch` with a registered id fails with
    /// [`ControlError::DuplicateId`] and leaves the existing command alone.
    pub fn launch(&self, spec: LaunchSpec) -> Result<(), ControlError> {
        let entry = self.register(spec)?;
        self.start_run(&entry);
        Ok(())
    }

    /// Deep copy of every command's observable state.
    pub fn snapshot(&self) -> Snapshot {
        let registry = self.read_registry();
        registry
            .iter()
            .map(|(id, entry)| (id.clone(), entry.lock().view()))
            .collect()
    }

    /// Deep copy of a single command's observable state.
    pub fn get(&self, id: &str) -> Option<CommandView> {
        self.read_registry().get(id).map(|entry| entry.lock().view())
    }

    pub fn len(&self) -> usize {
        self.read_registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_registry().is_empty()
    }

    /// Stop a command.
    ///
    /// - Running or pending commands become `Stopped`; a running process is
    ///   killed and reaped before this returns.
    /// - Commands that already reached a terminal state are left untouched and
    ///   reported as [`StopOutcome::AlreadyTerminal`].
    /// - If the kill itself fails the status is still `Stopped`, and the error
    ///   is returned as [`ControlError::KillFailed`].
    pub async fn stop(&self, id: &str) -> Result<StopOutcome, ControlError> {
        let entry = self.entry(id)?;
        let _gate = entry.control.lock().await;
        self.stop_entry(id, &entry).await
    }

    /// Stop the command if needed, then relaunch it with a fresh buffer.
    ///
    /// The previous process is reaped and its readers finished before the
    /// buffer is reset, so no output of the old run can show up in the new one.
    pub async fn restart(&self, id: &str) -> Result<(), ControlError> {
        let entry = self.entry(id)?;
        let _gate = entry.control.lock().await;
        if self.is_shut_down() {
            return Err(ControlError::ShutDown);
        }

        self.stop_entry(id, &entry).await?;
        self.quiesce(id, &entry).await?;

        if self.is_shut_down() {
            return Err(ControlError::ShutDown);
        }

        let run_id = {
            let mut command = entry.lock();
            command.restarts = 0;
            command.reset()
        };
        info!(id = %id, run_id, "restarting command");
        self.start_run(&entry);
        Ok(())
    }

    /// Kill everything and refuse further launches.
    ///
    /// Cancels the shared token (every runner blocked on its process unblocks
    /// and kills it), then stops each command still pending or running and
    /// waits for those kills. Calling it again is harmless.
    pub async fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("shutting down executor");
        }
        self.inner.shutdown.cancel();

        let entries: Vec<(CommandId, Arc<CommandEntry>)> = self
            .read_registry()
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        let mut stops = JoinSet::new();
        for (id, entry) in entries {
            let executor = self.clone();
            stops.spawn(async move {
                let _gate = entry.control.lock().await;
                match executor.stop_entry(&id, &entry).await {
                    Ok(StopOutcome::Stopped) => debug!(id = %id, "stopped on shutdown"),
                    Ok(StopOutcome::AlreadyTerminal(_)) => {}
                    Err(e) => warn!(id = %id, error = %e, "failed to stop command on shutdown"),
                }
            });
        }
        while stops.join_next().await.is_some() {}

        debug!("executor shutdown complete");
    }

    fn read_registry(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<CommandId, Arc<CommandEntry>>> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, id: &str) -> Result<Arc<CommandEntry>, ControlError> {
        self.read_registry()
            .get(id)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(id.to_string()))
    }

    fn register(&self, spec: LaunchSpec) -> Result<Arc<CommandEntry>, ControlError> {
        if self.is_shut_down() {
            return Err(ControlError::ShutDown);
        }

        let mut registry = self
            .inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if registry.contains_key(&spec.id) {
            return Err(ControlError::DuplicateId(spec.id));
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = spec.id.clone();
        debug!(id = %id, seq, cmd = %spec.command_line, "registering command");

        let command = Command::new(spec, seq, self.inner.options.max_output_lines);
        let entry = Arc::new(CommandEntry::new(command));
        registry.insert(id, Arc::clone(&entry));
        Ok(entry)
    }

    /// Spawn the runner task for the command's current run.
    fn start_run(&self, entry: &Arc<CommandEntry>) {
        let mut command = entry.lock();
        let run_id = command.run_id;
        let id = command.id().to_string();
        let ctx = RunContext {
            entry: Arc::clone(entry),
            run_id,
            spec: command.spec.clone(),
            max_restarts: self.inner.options.max_restarts,
            shutdown: self.inner.shutdown.clone(),
        };

        let executor = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = run_command(ctx).await;
            debug!(id = %id, run_id, ?outcome, "runner finished");
            if outcome == (RunOutcome::Exited { success: false }) {
                executor.schedule_auto_restart(&id, run_id);
            }
        });
        command.runner = Some(handle);
    }

    /// Stop with the control gate already held.
    async fn stop_entry(
        &self,
        id: &str,
        entry: &CommandEntry,
    ) -> Result<StopOutcome, ControlError> {
        let handle = {
            let mut command = entry.lock();
            let status = command.status();
            if status.is_terminal() {
                if command.restart_pending {
                    debug!(id = %id, "stop cancels the scheduled auto-restart");
                    command.restart_pending = false;
                }
                debug!(id = %id, %status, "stop requested for finished command; nothing to do");
                return Ok(StopOutcome::AlreadyTerminal(status));
            }
            command.mark_stopped()
        };

        info!(id = %id, "stopping command");
        if let Some(handle) = handle {
            handle.kill().await.map_err(|source| {
                warn!(id = %id, error = %source, "kill failed; command marked stopped anyway");
                ControlError::KillFailed {
                    id: id.to_string(),
                    source,
                }
            })?;
        }
        Ok(StopOutcome::Stopped)
    }

    /// Wait for the current runner task (and thus its process) to finish.
    async fn quiesce(&self, id: &str, entry: &CommandEntry) -> Result<(), ControlError> {
        let runner = entry.lock().runner.take();
        let Some(mut runner) = runner else {
            return Ok(());
        };

        match tokio::time::timeout(QUIESCE_TIMEOUT, &mut runner).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!(id = %id, "previous run still active; not restarting");
                entry.lock().runner = Some(runner);
                Err(ControlError::StillRunning(id.to_string()))
            }
        }
    }

    /// Relaunch a command after a failed exit, if the runner armed it.
    fn schedule_auto_restart(&self, id: &str, failed_run: u64) {
        let Ok(entry) = self.entry(id) else {
            return;
        };
        {
            let command = entry.lock();
            if !command.is_current(failed_run) || !command.spec.auto_restart {
                return;
            }
            if !command.restart_pending {
                info!(
                    id = %id,
                    restarts = command.restarts,
                    "auto-restart limit reached; leaving command failed"
                );
                return;
            }
        }

        let executor = self.clone();
        let id = id.to_string();
        let delay = self.inner.options.restart_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = executor.inner.shutdown.cancelled() => return,
            }
            executor.relaunch_after_failure(&id, &entry, failed_run).await;
        });
    }

    async fn relaunch_after_failure(&self, id: &str, entry: &Arc<CommandEntry>, failed_run: u64) {
        let _gate = entry.control.lock().await;
        if self.is_shut_down() {
            return;
        }

        let run_id = {
            let mut command = entry.lock();
            if !command.is_current(failed_run)
                || command.status() != CommandStatus::Failed
                || !command.restart_pending
            {
                debug!(id = %id, "command changed since it failed; skipping auto-restart");
                return;
            }
            command.restarts += 1;
            info!(id = %id, attempt = command.restarts, "auto-restarting failed command");
            command.reset()
        };
        debug!(id = %id, run_id, "auto-restart launched");
        self.start_run(entry);
    }
}
