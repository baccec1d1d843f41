//! Platform-appropriate directories for the agent.
//!
//! Uses the [`dirs`] crate for platform resolution, which is
//! sandbox-transparent on macOS. The path can be overridden for tests or
//! custom deployments with the `ROTAWEEK_CONFIG_DIR` environment variable.

use std::path::PathBuf;

/// Agent config directory (`config.toml` lives here).
///
/// Resolves to `dirs::config_dir()/rotaweek/` by default. Override with
/// the `ROTAWEEK_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ROTAWEEK_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("rotaweek"))
        .unwrap_or_else(|| PathBuf::from("/tmp/rotaweek-config"))
}
