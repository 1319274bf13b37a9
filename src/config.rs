//! TOML configuration for the matrix driver.
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (or their environment variable fallbacks)
//! 2. The TOML file, by default `$XDG_CONFIG_HOME/mosaic/mosaic.toml`
//! 3. Built-in defaults
//!
//! # Example
//!
//! ```toml
//! [device]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! [display]
//! width = 15
//! height = 15
//! frame_rate = 30
//!
//! [animations]
//! image_dir = "./images"
//! extension = "gif"
//! default = "fire"
//!
//! [animations.catalog]
//! heart = 3
//! fire = 8
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Catalog;

/// Animations tick on a millisecond timer.
const MAX_ANIMATION_FPS: u32 = 1000;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub display: DisplayConfig,
    pub control: ControlConfig,
    pub bypass: BypassConfig,
    pub animations: AnimationConfig,
    pub power: PowerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Serial write timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Frame updates per second sent to the device
    pub frame_rate: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 15,
            height: 15,
            frame_rate: 30,
        }
    }
}

impl DisplayConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis((1000.0 / self.frame_rate.max(1) as f64).round() as u64)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub listen: SocketAddr,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
    /// External frames buffered ahead of the transport before the oldest is dropped
    pub queue_depth: usize,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: SocketAddr::from(([127, 0, 0, 1], 8081)),
            queue_depth: 4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub image_dir: PathBuf,
    pub extension: String,
    pub default: String,
    /// Sprite animation name to frames per second
    pub catalog: BTreeMap<String, u32>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        let catalog = [
            ("heart", 3),
            ("bird", 6),
            ("eye", 10),
            ("flower", 6),
            ("rainbow", 24),
            ("fire", 8),
            ("pumpkin", 8),
        ]
        .into_iter()
        .map(|(name, fps)| (name.to_string(), fps))
        .collect();
        Self {
            image_dir: PathBuf::from("./images"),
            extension: "gif".to_string(),
            default: "fire".to_string(),
            catalog,
        }
    }
}

impl AnimationConfig {
    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.catalog.clone(), self.default.clone())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub shutdown_command: Vec<String>,
    pub reboot_command: Vec<String>,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            shutdown_command: vec!["systemctl".to_string(), "poweroff".to_string()],
            reboot_command: vec!["systemctl".to_string(), "reboot".to_string()],
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mosaic").join("mosaic.toml"))
    }

    /// Load from an explicit path, or from the default location when `path`
    /// is `None`. A missing default file yields the built-in defaults; a
    /// missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            tracing::debug!(path = ?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        tracing::info!(path = ?path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let display = &self.display;
        if display.width == 0 || display.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "display must be at least 1x1, got {}x{}",
                display.width, display.height
            )));
        }
        if display.frame_rate == 0 {
            return Err(ConfigError::ValidationError(
                "frame_rate must be greater than zero".to_string(),
            ));
        }
        if self.power.shutdown_command.is_empty() || self.power.reboot_command.is_empty() {
            return Err(ConfigError::ValidationError(
                "power commands must not be empty".to_string(),
            ));
        }

        let animations = &self.animations;
        if let Some((name, fps)) = animations
            .catalog
            .iter()
            .find(|(_, fps)| !(1..=MAX_ANIMATION_FPS).contains(*fps))
        {
            return Err(ConfigError::ValidationError(format!(
                "animation '{name}' frame rate {fps} is outside 1..={MAX_ANIMATION_FPS}"
            )));
        }
        if !animations.catalog.contains_key(&animations.default) {
            return Err(ConfigError::ValidationError(format!(
                "default animation '{}' is not in the catalog",
                animations.default
            )));
        }
        Ok(())
    }
}
