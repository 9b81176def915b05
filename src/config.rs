use crate::defaults;
use crate::error::{HugError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
}

/// Companion backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub timeout_secs: u64,
}

/// Microphone capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Stop a recording automatically after this many seconds (0 = never).
    pub max_recording_secs: u64,
}

/// Reply playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: defaults::BACKEND_URL.to_string(),
            timeout_secs: defaults::BACKEND_TIMEOUT_SECS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            max_recording_secs: defaults::MAX_RECORDING_SECS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: defaults::PLAYER_COMMAND.to_string(),
            args: defaults::PLAYER_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BackendConfig {
    /// Base URL with trailing slashes removed, ready for path concatenation.
    pub fn base_url(&self) -> String {
        normalize_base_url(&self.url)
    }
}

/// Strip trailing slashes so `{base}/chat-audio` never doubles up.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e.context(format!("Failed to load config from {}", path.display())))
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - GRANDPA_HUG_BACKEND_URL → backend.url
    /// - NEXT_PUBLIC_BACKEND_URL → backend.url (web client compatibility, lower priority)
    /// - GRANDPA_HUG_AUDIO_DEVICE → audio.device
    /// - GRANDPA_HUG_PLAYER → playback.command
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("GRANDPA_HUG_BACKEND_URL")
            && !url.is_empty()
        {
            self.backend.url = url;
        } else if let Ok(url) = std::env::var("NEXT_PUBLIC_BACKEND_URL")
            && !url.is_empty()
        {
            self.backend.url = url;
        }

        if let Ok(device) = std::env::var("GRANDPA_HUG_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(player) = std::env::var("GRANDPA_HUG_PLAYER")
            && !player.is_empty()
        {
            self.playback.command = player;
        }

        self
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(HugError::ConfigInvalidValue {
                key: "backend.url".to_string(),
                message: format!("must start with http:// or https://, got '{url}'"),
            });
        }
        if self.audio.sample_rate == 0 {
            return Err(HugError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.playback.command.trim().is_empty() {
            return Err(HugError::ConfigInvalidValue {
                key: "playback.command".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HugError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/grandpa-hug/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("grandpa-hug")
            .join("config.toml")
    }
}
