// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{CmdpoolError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CmdpoolError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.global, raw.commands))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_command_sets(cfg)?;
    validate_global_config(cfg)?;
    validate_command_sets(cfg)?;
    Ok(())
}

fn ensure_has_command_sets(cfg: &RawConfigFile) -> Result<()> {
    if cfg.commands.is_empty() {
        return Err(CmdpoolError::ConfigError(
            "config must contain at least one [commands.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.global.max_output_lines == 0 {
        return Err(CmdpoolError::ConfigError(
            "[global].max_output_lines must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.global.refresh_rate_ms == 0 {
        return Err(CmdpoolError::ConfigError(
            "[global].refresh_rate_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_command_sets(cfg: &RawConfigFile) -> Result<()> {
    for (key, set) in cfg.commands.iter() {
        if set.commands.is_empty() {
            return Err(CmdpoolError::ConfigError(format!(
                "command set '{}' has no commands",
                key
            )));
        }

        if let Some(i) = set.commands.iter().position(|c| c.trim().is_empty()) {
            return Err(CmdpoolError::ConfigError(format!(
                "command set '{}' has an empty command at index {}",
                key, i
            )));
        }

        for entry in set.env.iter() {
            match entry.split_once('=') {
                Some((name, _)) if !name.trim().is_empty() => {}
                _ => {
                    return Err(CmdpoolError::ConfigError(format!(
                        "command set '{}' has invalid env entry '{}' (expected KEY=VALUE)",
                        key, entry
                    )));
                }
            }
        }
    }
    Ok(())
}
