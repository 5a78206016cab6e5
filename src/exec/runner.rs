// src/exec/runner.rs

//! Individual command process runner.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::CommandFailure;
use crate::exec::command::{KillReply, LaunchSpec, MAX_LINE_BYTES, ProcessHandle};
use crate::exec::executor::CommandEntry;
use crate::exec::tokenizer::tokenize;
use crate::types::{CommandStatus, StreamKind};

/// How long the stream readers may keep draining once the process is gone.
///
/// Bounded because a grandchild that inherited the pipes could hold them
/// open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Inputs for one run of one command.
pub(crate) struct RunContext {
    pub(crate) entry: Arc<CommandEntry>,
    pub(crate) run_id: u64,
    pub(crate) spec: LaunchSpec,
    pub(crate) max_restarts: u32,
    pub(crate) shutdown: CancellationToken,
}

/// How a run ended, as seen by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// No process was started (tokenize/spawn/pipe failure).
    LaunchFailed,
    /// The process exited on its own and this runner wrote the final status.
    Exited { success: bool },
    /// A stop request ended the process.
    Killed,
    /// The shared shutdown token ended the process.
    Cancelled,
    /// The run was stopped or reset before the process was registered.
    Superseded,
}

enum Trigger {
    Exited(io::Result<ExitStatus>),
    KillRequested(Option<KillReply>),
    Shutdown,
}

/// Run a single command: spawn, capture both streams, wait, finalize.
///
/// The command lock is only taken for short state transitions; it is never
/// held while spawning, reading or waiting.
pub(crate) async fn run_command(ctx: RunContext) -> RunOutcome {
    let RunContext {
        entry,
        run_id,
        spec,
        max_restarts,
        shutdown,
    } = ctx;
    let id = spec.id.as_str();

    info!(id = %id, run_id, cmd = %spec.command_line, "starting command process");

    let Some(parsed) = tokenize(&spec.command_line) else {
        return fail_launch(&entry, id, run_id, CommandFailure::EmptyCommand);
    };

    if shutdown.is_cancelled() {
        let mut command = entry.lock();
        if command.is_current(run_id) && command.status() == CommandStatus::Pending {
            debug!(id = %id, run_id, "executor shut down before spawn");
            command.mark_stopped();
        }
        return RunOutcome::Superseded;
    }

    let mut cmd = ProcessCommand::new(&parsed.program);
    cmd.args(&parsed.args)
        .current_dir(&spec.working_dir)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a kill reaches everything the command started.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            let failure = CommandFailure::Spawn {
                program: parsed.program.clone(),
                message: err.to_string(),
            };
            return fail_launch(&entry, id, run_id, failure);
        }
    };

    let pid = child.id();
    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => (stdout, stderr),
        (stdout, _) => {
            let stream = if stdout.is_none() {
                StreamKind::Stdout
            } else {
                StreamKind::Stderr
            };
            if let Err(e) = kill_process_tree(&mut child).await {
                warn!(id = %id, run_id, error = %e, "failed to kill process after pipe setup failure");
            }
            return fail_launch(&entry, id, run_id, CommandFailure::StreamSetup { stream });
        }
    };

    let (kill_tx, mut kill_rx) = oneshot::channel::<KillReply>();
    let registered = entry
        .lock()
        .mark_running(run_id, ProcessHandle::new(pid, kill_tx));
    if !registered {
        debug!(id = %id, run_id, "command stopped before its process registered; killing it");
        let _ = kill_process_tree(&mut child).await;
        return RunOutcome::Superseded;
    }

    info!(id = %id, run_id, pid = ?pid, "command process running");

    let readers = Readers {
        stdout: spawn_reader(stdout, Arc::clone(&entry), run_id, StreamKind::Stdout),
        stderr: spawn_reader(stderr, Arc::clone(&entry), run_id, StreamKind::Stderr),
    };

    // Either the process exits on its own, a stop request arrives through the
    // handle, or the whole executor is shutting down.
    let trigger = tokio::select! {
        status = child.wait() => Trigger::Exited(status),
        request = &mut kill_rx => Trigger::KillRequested(request.ok()),
        _ = shutdown.cancelled() => Trigger::Shutdown,
    };

    match trigger {
        Trigger::Exited(status) => {
            readers.drain(id, run_id).await;

            let result = exit_result(status);
            let success = result.is_ok();
            if let Err(ref failure) = result {
                info!(id = %id, run_id, error = %failure, "command process failed");
            } else {
                info!(id = %id, run_id, "command process exited successfully");
            }

            let finalized = {
                let mut command = entry.lock();
                let finalized = command.finish_exit(run_id, result);
                if finalized && !success {
                    command.arm_auto_restart(max_restarts);
                }
                finalized
            };
            if finalized {
                return RunOutcome::Exited { success };
            }

            // A stop request took the handle in the same instant; answer it so
            // the caller learns the process was already gone.
            debug!(id = %id, run_id, "process exited while a stop was in flight");
            if let Ok(reply) = kill_rx.await {
                let _ = reply.send(Err(io::Error::other(
                    "process exited before it could be killed",
                )));
            }
            RunOutcome::Killed
        }

        Trigger::KillRequested(reply) => {
            info!(id = %id, run_id, "stop requested; killing process");
            match kill_process_tree(&mut child).await {
                Ok(()) => {
                    readers.drain(id, run_id).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(()));
                    }
                }
                Err(e) => {
                    warn!(id = %id, run_id, error = %e, "failed to kill process");
                    if let Some(reply) = reply {
                        let _ = reply.send(Err(e));
                    }
                    wait_or_shutdown(&mut child, &shutdown).await;
                    readers.drain(id, run_id).await;
                }
            }
            RunOutcome::Killed
        }

        Trigger::Shutdown => {
            info!(id = %id, run_id, "shutdown requested; killing process");
            let killed = kill_process_tree(&mut child).await;
            if let Err(ref e) = killed {
                warn!(id = %id, run_id, error = %e, "failed to kill process on shutdown");
            }
            readers.drain(id, run_id).await;

            let finalized = entry.lock().finish_cancelled(run_id);
            if !finalized {
                // A concurrent stop owns the handle and is waiting for us.
                if let Ok(reply) = kill_rx.await {
                    let _ = reply.send(killed);
                }
            }
            RunOutcome::Cancelled
        }
    }
}

fn fail_launch(
    entry: &CommandEntry,
    id: &str,
    run_id: u64,
    failure: CommandFailure,
) -> RunOutcome {
    warn!(id = %id, run_id, error = %failure, "command failed to launch");
    if !entry.lock().fail_launch(run_id, failure) {
        debug!(id = %id, run_id, "launch failure for a run that was already stopped");
    }
    RunOutcome::LaunchFailed
}

async fn wait_or_shutdown(child: &mut Child, shutdown: &CancellationToken) {
    tokio::select! {
        _ = child.wait() => {}
        _ = shutdown.cancelled() => {
            let _ = kill_process_tree(child).await;
        }
    }
}

/// SIGKILL the child's process group, then kill and reap the child itself.
async fn kill_process_tree(child: &mut Child) -> io::Result<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(pid as i32);
        if let Err(errno) = killpg(pgid, Signal::SIGKILL) {
            debug!(pid, error = %errno, "failed to signal process group");
        }
    }
    child.kill().await
}

fn exit_result(status: io::Result<ExitStatus>) -> Result<(), CommandFailure> {
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(CommandFailure::Exit {
            code: status.code(),
            signal: exit_signal(&status),
        }),
        Err(e) => Err(CommandFailure::Wait {
            message: e.to_string(),
        }),
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// The two stream readers of one run.
struct Readers {
    stdout: JoinHandle<()>,
    stderr: JoinHandle<()>,
}

impl Readers {
    /// Wait for both readers to hit EOF, aborting them after the drain timeout.
    async fn drain(self, id: &str, run_id: u64) {
        let Readers { mut stdout, mut stderr } = self;
        let drained = tokio::time::timeout(READER_DRAIN_TIMEOUT, async {
            let _ = (&mut stdout).await;
            let _ = (&mut stderr).await;
        })
        .await
        .is_ok();
        if !drained {
            warn!(id = %id, run_id, "output streams still open after exit; abandoning readers");
            stdout.abort();
            stderr.abort();
        }
    }
}

fn spawn_reader<R>(
    stream: R,
    entry: Arc<CommandEntry>,
    run_id: u64,
    kind: StreamKind,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            // Longer lines are split into MAX_LINE_BYTES chunks.
            let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
            match limited.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = kind.tag(decode_line(&buf));
                    let appended = entry.lock().append(run_id, line);
                    if !appended {
                        debug!(run_id, stream = %kind, "run superseded; reader exiting");
                        break;
                    }
                }
                Err(e) => {
                    debug!(run_id, stream = %kind, error = %e, "stream read failed");
                    break;
                }
            }
        }
    })
}

/// Strip the line terminator and decode lossily; commands may print any bytes.
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
