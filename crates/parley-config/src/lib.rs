//! Configuration for the Parley session server.
//!
//! Provides TOML-based configuration with:
//! - Layered discovery (user config dir, then `./parley.toml`) or one explicit file
//! - Environment overrides for secrets (`PARLEY_JWT_SECRET`)
//! - Validation of settings the server cannot start with

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    load_config, load_config_file, user_config_dir, user_config_path, ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use types::*;
