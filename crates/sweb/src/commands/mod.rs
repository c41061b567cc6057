//! CLI command handlers.

pub mod serve;
pub mod sessions;

use sweb_config::SwebConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration from all discovered layers.
    pub config: SwebConfig,
    /// Verbose output enabled.
    pub verbose: bool,
}
