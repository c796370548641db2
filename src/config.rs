use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::device::DEFAULT_DEVICE_ID;
use crate::error::ConfigError;

/// Emulator configuration, persisted as TOML next to the emulated
/// application. Field names mirror the knobs of the original ini file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Directory scanned for TrackNN.* audio files.
    pub music_dir: PathBuf,
    /// Honor sub-track seek offsets. When off, seeks snap to track starts.
    pub accurate_seek: bool,
    /// Emit immediate success notifications for every notify-requesting
    /// command, not only for completed playback.
    pub full_notify: bool,
    /// Initial playback volume in percent, 0..=100.
    pub volume: u32,
    /// Device identifier reported by the structured open command.
    pub device_id: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            music_dir: PathBuf::from("MUSIC"),
            accurate_seek: true,
            full_notify: false,
            volume: 100,
            device_id: DEFAULT_DEVICE_ID,
        }
    }
}

impl EmulatorConfig {
    /// Default config file location, next to the emulated application.
    pub fn default_path() -> PathBuf {
        PathBuf::from("cdaudio.toml")
    }

    /// Load the configuration, writing a default file when none exists.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                warn!("Could not write default config {}: {}", path.display(), e);
            } else {
                info!("Created default config at {}", path.display());
            }
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save the configuration to the given path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.volume > 100 {
            return Err(ConfigError::InvalidValue {
                key: "volume".to_string(),
                details: format!("{} is out of range 0..=100", self.volume),
            });
        }
        Ok(())
    }
}
