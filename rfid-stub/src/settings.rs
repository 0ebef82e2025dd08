//! Application settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use rfid_sim::{RosterConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors loading a settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Tag generator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorSettings {
    /// First byte of every generated tag, shared by all readers of this instance
    pub discriminator: u8,
    /// Pause between generated tags in milliseconds
    pub interval_ms: u64,
}

impl GeneratorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            discriminator: 0x01,
            interval_ms: 1000,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Readers and their links
    pub session: SessionConfig,
    /// Where participants come from
    pub roster: RosterConfig,
    /// Mark sent participants in the menu
    pub track_sent: bool,
    pub generator: GeneratorSettings,
    /// Reader paths watched by `dump`
    pub dump_paths: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            roster: RosterConfig::default(),
            track_sent: true,
            generator: GeneratorSettings::default(),
            dump_paths: vec![PathBuf::from("dev/rfid0"), PathBuf::from("dev/rfid1")],
        }
    }
}

impl Settings {
    /// Get the XDG config directory for rfidstub
    /// Uses $XDG_CONFIG_HOME/rfidstub, falls back to ~/.config/rfidstub
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("rfidstub"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("rfidstub"))
    }

    /// Get the default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load from `path`, or the default location when `None`
    ///
    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        debug!("Loaded settings from {}", path.display());
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
