//! Agent configuration: refresh cron, timezone, and feed settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ScheduleError};

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Refresh cron expression (5-field). Absent disables scheduled
    /// refreshes; manual refreshes keep working.
    pub refresh_cron: Option<String>,
    /// IANA timezone for schedule arithmetic and timestamps.
    pub timezone: String,
    /// Schedule feed settings.
    pub fetch: FetchConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            refresh_cron: None,
            timezone: "America/Toronto".to_owned(),
            fetch: FetchConfig::default(),
        }
    }
}

/// Schedule feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Feed endpoint; employee and date are appended as query values.
    pub base_url: String,
    /// Employee name exactly as published by the feed.
    pub employee: String,
    /// HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Directory for raw feed snapshots; absent disables persistence.
    pub persist_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            employee: String::new(),
            timeout_seconds: 30,
            persist_dir: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ScheduleError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot
    /// be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ScheduleError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path under the platform config dir.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::paths::config_dir().join("config.toml")
    }

    /// The configured timezone, resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Timezone`] for an unknown IANA name.
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| ScheduleError::Timezone(format!("unknown timezone `{}`", self.timezone)))
    }

    /// Validate the configuration for running the agent.
    ///
    /// A malformed `refresh_cron` is not a validation error:
    /// the scheduler reports it as a refresh error and stays idle, and
    /// manual refreshes keep working.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: unknown timezone, missing feed
    /// endpoint or employee, or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        if self.fetch.base_url.trim().is_empty() {
            return Err(ScheduleError::Config(
                "fetch.base_url is required".to_owned(),
            ));
        }
        if self.fetch.employee.trim().is_empty() {
            return Err(ScheduleError::Config(
                "fetch.employee is required".to_owned(),
            ));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(ScheduleError::Config(
                "fetch.timeout_seconds must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
