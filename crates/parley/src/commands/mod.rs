//! CLI command handlers.

pub mod check_config;
pub mod serve;
pub mod token;

use parley_config::LoadedConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Configuration as discovered, merged and overridden.
    pub loaded: LoadedConfig,
    /// Verbose output enabled.
    pub verbose: bool,
}
