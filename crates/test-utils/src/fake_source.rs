use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use cmdpool::exec::{CommandView, Snapshot};
use cmdpool::monitor::CommandSource;
use cmdpool::types::CommandStatus;

/// A `CommandSource` that replays a fixed sequence of snapshots.
///
/// Each call to `snapshot()` returns the next scripted frame; once the
/// script runs out the last frame is repeated.
pub struct ScriptedSource {
    frames: Mutex<VecDeque<Snapshot>>,
    last: Mutex<Snapshot>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Snapshot>) -> Self {
        Self {
            frames: Mutex::new(frames.into()),
            last: Mutex::new(Snapshot::new()),
        }
    }
}

impl CommandSource for ScriptedSource {
    fn snapshot(&self) -> Snapshot {
        let next = self.frames.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(frame) = next {
            *last = frame;
        }
        last.clone()
    }
}

/// Build one frame from views.
pub fn frame(views: impl IntoIterator<Item = CommandView>) -> Snapshot {
    views.into_iter().map(|v| (v.id.clone(), v)).collect()
}

/// A `CommandView` with the given id/status/output and neutral defaults.
///
/// `total_lines` is set to the number of lines in `output`; override it to
/// simulate evicted lines.
pub fn view(id: &str, seq: u64, status: CommandStatus, output: &[&str]) -> CommandView {
    CommandView {
        id: id.to_string(),
        name: format!("echo {id}"),
        command_line: format!("echo {id}"),
        working_dir: PathBuf::from("."),
        status,
        output: output.iter().map(|s| s.to_string()).collect(),
        total_lines: output.len() as u64,
        started_at: Utc::now(),
        ended_at: status.is_terminal().then(Utc::now),
        last_error: None,
        auto_restart: false,
        restarts: 0,
        restart_pending: false,
        run: 0,
        pid: None,
        seq,
    }
}
