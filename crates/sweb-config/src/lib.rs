//! Configuration system for the sweb session server.
//!
//! Provides TOML-based configuration with:
//! - `[session]` provider selection, timeouts and persistence directory
//! - `[cookie]` session cookie attributes
//! - `[server]` listen address
//! - Config file layering (user config dir + project-local + explicit file)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, config_dir, load_config, load_config_file, load_config_with_options,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
