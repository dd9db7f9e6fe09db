//! Configuration types for the notification engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the notification engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Reminder scheduling window and capacity settings.
    pub scheduler: SchedulerConfig,
    /// Reminder derivation settings.
    pub reminders: ReminderConfig,
    /// Activity store settings.
    pub store: StoreConfig,
}

/// Window, capacity, and refresh cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Look-ahead window in days: reminders firing later than this are
    /// deliberately left unscheduled until a later refresh.
    pub window_days: u32,
    /// Fetch horizon in days; must be at least `window_days`.
    pub horizon_days: u32,
    /// Maximum concurrently scheduled notifications.
    ///
    /// Kept strictly below the platform's hard ceiling (64 on the
    /// tightest supported platform) so the OS never silently drops a
    /// schedule request.
    pub max_scheduled: usize,
    /// Hours between periodic full refreshes.
    pub refresh_interval_hours: u32,
    /// Attempts per individual schedule/cancel call before the item is
    /// abandoned for the cycle.
    pub sink_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window_days: 60,
            horizon_days: 90,
            max_scheduled: 60,
            refresh_interval_hours: 12,
            sink_attempts: 2,
        }
    }
}

impl SchedulerConfig {
    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a config error when the horizon is shorter than the window,
    /// or when the window or capacity is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.window_days == 0 {
            return Err(crate::NotifyError::Config(
                "window_days must be positive".to_owned(),
            ));
        }
        if self.horizon_days < self.window_days {
            return Err(crate::NotifyError::Config(format!(
                "horizon_days ({}) must be >= window_days ({})",
                self.horizon_days, self.window_days
            )));
        }
        if self.max_scheduled == 0 {
            return Err(crate::NotifyError::Config(
                "max_scheduled must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

/// How reminders are derived from activity rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Minutes after an activity ends before the feedback prompt fires.
    /// `None` disables feedback reminders.
    pub feedback_delay_minutes: Option<u32>,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            feedback_delay_minutes: Some(30),
        }
    }
}

/// Activity store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the SQLite database (`None` = platform default).
    pub root_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { root_dir: None }
    }
}

impl StoreConfig {
    /// Resolve the store root, falling back to `~/.local/share/pitchside`.
    pub fn resolved_root(&self) -> PathBuf {
        if let Some(root) = &self.root_dir {
            return root.clone();
        }
        if let Some(data) = dirs::data_dir() {
            data.join("pitchside")
        } else {
            PathBuf::from("/tmp/pitchside-data")
        }
    }
}

impl NotifyConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::NotifyError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::NotifyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/pitchside/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = dirs::config_dir() {
            config.join("pitchside").join("config.toml")
        } else {
            PathBuf::from("/tmp/pitchside-config/config.toml")
        }
    }
}
