#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use cmdpool::config::{CommandSet, ConfigFile, GlobalSection, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                global: GlobalSection::default(),
                commands: BTreeMap::new(),
            },
        }
    }

    pub fn with_set(mut self, key: &str, set: CommandSet) -> Self {
        self.config.commands.insert(key.to_string(), set);
        self
    }

    pub fn max_output_lines(mut self, n: usize) -> Self {
        self.config.global.max_output_lines = n;
        self
    }

    pub fn refresh_rate_ms(mut self, ms: u64) -> Self {
        self.config.global.refresh_rate_ms = ms;
        self
    }

    /// The raw, unvalidated config.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `CommandSet`.
pub struct CommandSetBuilder {
    set: CommandSet,
}

impl CommandSetBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            set: CommandSet {
                commands: vec![cmd.to_string()],
                ..CommandSet::default()
            },
        }
    }

    pub fn command(mut self, cmd: &str) -> Self {
        self.set.commands.push(cmd.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.set.name = name.to_string();
        self
    }

    pub fn dir(mut self, dir: &str) -> Self {
        self.set.dir = Some(PathBuf::from(dir));
        self
    }

    pub fn auto_restart(mut self, val: bool) -> Self {
        self.set.auto_restart = val;
        self
    }

    pub fn env(mut self, entry: &str) -> Self {
        self.set.env.push(entry.to_string());
        self
    }

    pub fn build(self) -> CommandSet {
        self.set
    }
}
