// src/config/mod.rs

//! Configuration loading and validation for cmdpool.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load and save a config file (`loader.rs`).
//! - Validate command sets and global settings (`validate.rs`).
//!
//! The executor never reads this format itself; it only receives the
//! resolved `LaunchSpec`s.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_base_dir, load_and_validate, load_from_path, save};
pub use model::{CommandSet, ConfigFile, GlobalSection, RawConfigFile};
