//! Configuration system for the Acolyte flow engine.
//!
//! TOML configuration with three sections (`[database]`, `[engine]`,
//! `[logging]`), layered from the user config dir, a project-local
//! `acolyte.toml` and an explicit file.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
