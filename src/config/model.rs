// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::exec::{DEFAULT_MAX_OUTPUT_LINES, ExecutorOptions, LaunchSpec};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [global]
/// log_file = "cmdpool.log"
/// max_output_lines = 1000
/// refresh_rate_ms = 100
///
/// [commands.backend]
/// name = "Backend"
/// commands = ["cargo run --bin api", "cargo run --bin worker"]
/// dir = "backend"
/// auto_restart = true
/// env = ["RUST_LOG=debug"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfigFile {
    /// Global settings from `[global]`.
    #[serde(default)]
    pub global: GlobalSection,

    /// Command sets from `[commands.<key>]`, keyed by set key.
    #[serde(default)]
    pub commands: BTreeMap<String, CommandSet>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigFile {
    pub global: GlobalSection,
    pub commands: BTreeMap<String, CommandSet>,
}

/// `[global]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GlobalSection {
    /// Append logs to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Lines kept per command.
    #[serde(default = "default_max_output_lines")]
    pub max_output_lines: usize,

    /// Monitor polling interval.
    #[serde(default = "default_refresh_rate_ms")]
    pub refresh_rate_ms: u64,

    /// Automatic relaunches per command for sets with `auto_restart = true`.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

fn default_max_output_lines() -> usize {
    DEFAULT_MAX_OUTPUT_LINES
}

fn default_refresh_rate_ms() -> u64 {
    100
}

fn default_max_restarts() -> u32 {
    3
}

fn default_restart_delay_ms() -> u64 {
    1000
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            log_file: None,
            max_output_lines: default_max_output_lines(),
            refresh_rate_ms: default_refresh_rate_ms(),
            max_restarts: default_max_restarts(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

impl GlobalSection {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms)
    }

    /// Executor settings; `default_dir` is where relative set dirs resolve from.
    pub fn executor_options(&self, default_dir: impl Into<PathBuf>) -> ExecutorOptions {
        ExecutorOptions {
            max_output_lines: self.max_output_lines,
            default_dir: default_dir.into(),
            max_restarts: self.max_restarts,
            restart_delay: Duration::from_millis(self.restart_delay_ms),
        }
    }
}

/// `[commands.<key>]` section: a named group of commands sharing settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct CommandSet {
    /// Human readable name, used as a display prefix.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Command lines, split by the executor's tokenizer (no shell).
    #[serde(default)]
    pub commands: Vec<String>,

    /// Working directory; relative paths resolve against the config file's
    /// directory. Defaults to that directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    pub auto_restart: bool,

    /// Extra environment as `KEY=VALUE` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

impl CommandSet {
    /// Parsed `env` entries. Malformed entries are rejected by validation,
    /// so here they are simply skipped.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .collect()
    }

    fn working_dir(&self, base_dir: &Path) -> PathBuf {
        match &self.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base_dir.join(dir),
            None => base_dir.to_path_buf(),
        }
    }

    /// Launch specs for every command of this set; ids are `<key>_<index>`.
    pub fn launch_specs(&self, key: &str, base_dir: &Path) -> Vec<LaunchSpec> {
        let dir = self.working_dir(base_dir);
        let env = self.env_pairs();
        self.commands
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let mut spec = LaunchSpec::new(format!("{key}_{i}"), line.clone())
                    .dir(dir.clone())
                    .auto_restart(self.auto_restart);
                if !self.name.is_empty() {
                    spec = spec.name(format!("{}: {}", self.name, line));
                }
                spec.env = env.clone();
                spec
            })
            .collect()
    }
}

impl ConfigFile {
    /// Only `validate.rs` should call this, after checking invariants.
    pub(crate) fn new_unchecked(
        global: GlobalSection,
        commands: BTreeMap<String, CommandSet>,
    ) -> Self {
        Self { global, commands }
    }

    pub fn command_set(&self, key: &str) -> Option<&CommandSet> {
        self.commands.get(key)
    }

    /// Resolve launch specs for one set, or for every set in key order.
    pub fn launch_specs(
        &self,
        set: Option<&str>,
        base_dir: &Path,
    ) -> crate::errors::Result<Vec<LaunchSpec>> {
        match set {
            Some(key) => self
                .commands
                .get(key)
                .map(|s| s.launch_specs(key, base_dir))
                .ok_or_else(|| crate::errors::CmdpoolError::CommandSetNotFound(key.to_string())),
            None => Ok(self
                .commands
                .iter()
                .flat_map(|(key, s)| s.launch_specs(key, base_dir))
                .collect()),
        }
    }

    /// The configuration written by `--init-config`.
    pub fn default_config() -> Self {
        let mut commands = BTreeMap::new();
        commands.insert(
            "example".to_string(),
            CommandSet {
                name: "Example".to_string(),
                description: "Example command set".to_string(),
                commands: vec!["echo \"Hello World\"".to_string(), "sleep 5".to_string()],
                dir: Some(PathBuf::from(".")),
                auto_restart: false,
                env: Vec::new(),
            },
        );
        Self {
            global: GlobalSection {
                log_file: Some(PathBuf::from("cmdpool.log")),
                ..GlobalSection::default()
            },
            commands,
        }
    }
}
