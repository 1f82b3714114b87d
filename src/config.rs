//! Configuration parsing and management for vtrack

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, VtrackError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub tracking: TrackingConfig,
    pub vmc: VmcConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, VtrackError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e)))?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, VtrackError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the given path, falling back to defaults
    /// when no path is given or the file does not exist.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, VtrackError> {
        match path {
            Some(path) if path.as_ref().exists() => {
                tracing::info!("Loading config from: {}", path.as_ref().display());
                Self::from_file(path)
            }
            Some(path) => {
                tracing::info!(
                    "Config file {} not found, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), VtrackError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "camera.width/height".to_string(),
                message: "Capture resolution must be greater than 0".to_string(),
            }
            .into());
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "camera.fps".to_string(),
                message: "Frame rate must be greater than 0".to_string(),
            }
            .into());
        }

        if !(0.0..=1.0).contains(&self.tracking.smoothing_factor) {
            return Err(ConfigError::InvalidValue {
                field: "tracking.smoothing_factor".to_string(),
                message: "Smoothing factor must be between 0.0 and 1.0".to_string(),
            }
            .into());
        }

        if self.vmc.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vmc.port".to_string(),
                message: "Port must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Webcam capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index
    pub device_id: u32,
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Target frame rate
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Face/hand/pose tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Enable face landmark tracking
    pub enable_face: bool,
    /// Enable hand landmark tracking
    pub enable_hands: bool,
    /// Enable body pose tracking
    pub enable_pose: bool,
    /// Kalman filter smoothing factor (0.0 = maximum smoothing, 1.0 = none)
    pub smoothing_factor: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enable_face: true,
            enable_hands: true,
            enable_pose: true,
            smoothing_factor: 0.5,
        }
    }
}

/// VMC protocol sender configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmcConfig {
    /// Enable VMC protocol output
    pub enabled: bool,
    /// Destination address
    pub address: String,
    /// Destination UDP port
    pub port: u16,
}

impl Default for VmcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "127.0.0.1".to_string(),
            port: 39539,
        }
    }
}
