use std::fmt;

/// Canonical command identifier type used throughout the executor.
pub type CommandId = String;

/// Lifecycle state of a supervised command.
///
/// - `Pending`: registered, process not started yet.
/// - `Running`: the OS process is alive and its streams are being captured.
/// - `Done`: the process exited successfully.
/// - `Failed`: spawning failed, or the process exited with a failure.
/// - `Stopped`: termination was requested before the process exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Pending,
    Running,
    Done,
    Failed,
    Stopped,
}

impl CommandStatus {
    /// `Done`, `Failed` and `Stopped` only leave via a restart.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Done | CommandStatus::Failed | CommandStatus::Stopped
        )
    }

    /// Short marker used by the monitor's final summary.
    pub fn marker(self) -> &'static str {
        match self {
            CommandStatus::Pending => "..",
            CommandStatus::Running => ">>",
            CommandStatus::Done => "ok",
            CommandStatus::Failed => "!!",
            CommandStatus::Stopped => "--",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Running => "running",
            CommandStatus::Done => "done",
            CommandStatus::Failed => "failed",
            CommandStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Which process stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Prefix applied to lines captured from standard error.
pub const STDERR_TAG: &str = "[STDERR] ";

impl StreamKind {
    /// Tag a raw line so consumers can tell stderr apart without a second buffer.
    pub fn tag(self, line: String) -> String {
        match self {
            StreamKind::Stdout => line,
            StreamKind::Stderr => format!("{STDERR_TAG}{line}"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
