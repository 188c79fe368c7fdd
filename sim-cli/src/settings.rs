//! Application settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sim_control::{ControllerConfig, LedIndicator, DEFAULT_POLL_PERIOD};
use sim_runtime::{ScriptConfig, DEFAULT_ENTRY, DEFAULT_INSTRUCTION_BUDGET};
use tracing::{debug, warn};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Tick period in milliseconds
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,
    /// Instructions a script may execute per tick
    #[serde(default = "default_instruction_budget")]
    pub instruction_budget: u32,
    /// Script compilation starts from
    #[serde(default = "default_entry")]
    pub entry: String,
    /// Status LED wiring
    #[serde(default)]
    pub led: LedIndicator,
    /// Report LED changes while running
    #[serde(default = "default_true")]
    pub show_led: bool,
}

fn default_poll_period_ms() -> u64 {
    DEFAULT_POLL_PERIOD.as_millis() as u64
}

fn default_instruction_budget() -> u32 {
    DEFAULT_INSTRUCTION_BUDGET
}

fn default_entry() -> String {
    DEFAULT_ENTRY.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_period_ms: default_poll_period_ms(),
            instruction_budget: default_instruction_budget(),
            entry: default_entry(),
            led: LedIndicator::default(),
            show_led: true,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for scriptsim
    /// Uses $XDG_CONFIG_HOME/scriptsim, falls back to ~/.config/scriptsim
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("scriptsim"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("scriptsim"))
    }

    /// Get the default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Ignoring invalid settings in {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => {
                debug!("No settings at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Save settings to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).context("Failed to write settings")?;

        Ok(())
    }

    /// Controller configuration derived from these settings
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            script: ScriptConfig {
                entry: self.entry.clone(),
                instruction_budget: self.instruction_budget,
            },
            poll_period_ms: self.poll_period_ms,
            led: self.led,
        }
    }
}
