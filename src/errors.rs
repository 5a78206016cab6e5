// src/errors.rs

//! Crate-wide error types.
//!
//! - [`CommandFailure`] is stored on a command record as its last error; it is
//!   cheap to clone so snapshots can carry it.
//! - [`ControlError`] is returned to callers of the executor's control API.
//! - [`CmdpoolError`] covers everything else (config, IO, CLI resolution).

use thiserror::Error;

use crate::types::StreamKind;

/// Why a single command ended up `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to start '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("failed to attach to {stream} of the process")]
    StreamSetup { stream: StreamKind },

    #[error("{}", describe_exit(.code, .signal))]
    Exit {
        code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("failed to wait for process: {message}")]
    Wait { message: String },
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*code, *signal) {
        (Some(code), _) => format!("exit status {code}"),
        (None, Some(sig)) => format!("terminated by signal {sig}"),
        (None, None) => "exited with unknown status".to_string(),
    }
}

/// Errors returned by `Executor` control operations.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("command {0} not found")]
    NotFound(String),

    #[error("failed to kill process of command {id}: {source}")]
    KillFailed {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command id {0} is already registered")]
    DuplicateId(String),

    #[error("previous process of command {0} has not exited yet")]
    StillRunning(String),

    #[error("executor has been shut down")]
    ShutDown,
}

#[derive(Error, Debug)]
pub enum CmdpoolError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("command set '{0}' not found")]
    CommandSetNotFound(String),

    #[error("no commands specified. Use -e, provide arguments, or use --config")]
    NoCommands,

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CmdpoolError>;
