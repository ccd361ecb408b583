//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/parley/config.toml` (user config)
//! 2. `./parley.toml` (project-local)
//! 3. Environment overrides (`PARLEY_JWT_SECRET`)
//!
//! An explicit path (`--config` / `PARLEY_CONFIG`) replaces steps 1 and 2.

use std::path::{Path, PathBuf};

use crate::{ConfigError, ParleyConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "parley.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "parley";

/// Overrides the platform config directory.
const CONFIG_DIR_ENV: &str = "PARLEY_CONFIG_DIR";

/// Overrides `[auth] jwt_secret`.
pub const JWT_SECRET_ENV: &str = "PARLEY_JWT_SECRET";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: ParleyConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Environment variables that overrode file values.
    pub env_overrides: Vec<&'static str>,
    /// Warnings generated during loading (e.g., plaintext secrets).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration from `explicit`, or by discovery when `None`.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with(explicit, None, user_config_dir().as_deref(), |key| {
        std::env::var(key).ok()
    })
}

/// Load configuration with every input supplied by the caller.
///
/// `project_dir` defaults to the working directory; `config_dir` of `None`
/// skips the user layer. `env` looks up override variables.
pub fn load_config_with(
    explicit: Option<&Path>,
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<LoadedConfig> {
    let mut merged = toml::Table::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    match explicit {
        Some(path) => {
            let layer = read_layer(path)?;
            merge_tables(&mut merged, layer);
            sources.push(ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            });
        }
        None => {
            if let Some(dir) = config_dir {
                let path = dir.join(USER_CONFIG_FILE);
                sources.push(load_layer(&mut merged, &path, &mut warnings));
            }

            let path = project_dir
                .map(|d| d.join(PROJECT_CONFIG_FILE))
                .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
            sources.push(load_layer(&mut merged, &path, &mut warnings));
        }
    }

    let mut config: ParleyConfig = toml::Value::Table(merged).try_into()?;

    if config.auth.jwt_secret.is_some() {
        warnings.push(
            "[auth] contains a plaintext JWT secret. \
             Consider setting PARLEY_JWT_SECRET instead."
                .to_string(),
        );
    }

    let env_overrides = apply_env_overrides(&mut config, env);

    Ok(LoadedConfig {
        config,
        sources,
        env_overrides,
        warnings,
    })
}

/// Load config from a specific file path (no discovery, no overrides).
pub fn load_config_file(path: &Path) -> Result<ParleyConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    ParleyConfig::from_toml(&contents)
}

/// Get the user config file path.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the user config directory for parley.
///
/// Checks `PARLEY_CONFIG_DIR` first, then falls back to the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

fn read_layer(path: &Path) -> Result<toml::Table> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(contents.parse::<toml::Table>()?)
}

/// Try to load a discovered file; failures become warnings.
fn load_layer(merged: &mut toml::Table, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match read_layer(path) {
        Ok(layer) => {
            merge_tables(merged, layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

/// Merge `layer` into `base` key by key; nested tables merge, everything else replaces.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(
    config: &mut ParleyConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Vec<&'static str> {
    let mut applied = Vec::new();
    if let Some(secret) = env(JWT_SECRET_ENV).filter(|s| !s.is_empty()) {
        config.auth.jwt_secret = Some(secret);
        applied.push(JWT_SECRET_ENV);
    }
    applied
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
