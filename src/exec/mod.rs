// src/exec/mod.rs

//! Process execution layer.
//!
//! This module owns the lifecycle of every supervised OS process, using
//! `tokio::process::Command`, and keeps the captured output in per-command
//! bounded buffers.
//!
//! - [`executor`] holds the registry and the control API (`submit`, `launch`,
//!   `snapshot`, `stop`, `restart`, `shutdown`).
//! - [`runner`] runs one process: spawn, dual stream capture, wait, finalize.
//! - [`command`] is the per-command state record and its output buffer.
//! - [`tokenizer`] splits a command line into program and arguments.

pub mod command;
pub mod executor;
mod runner;
pub mod tokenizer;

pub use command::{CommandView, DEFAULT_MAX_OUTPUT_LINES, LaunchSpec, MAX_LINE_BYTES, OutputBuffer};
pub use executor::{Executor, ExecutorOptions, Snapshot, StopOutcome};
pub use tokenizer::{ParsedCommand, split_tokens, tokenize};
