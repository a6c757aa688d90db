//! Camera capture configuration.
//!
//! Exposure and white balance are locked once at startup. Colorimetric
//! comparison between the baseline and exposed strip requires stable
//! brightness; auto-exposure would shift colors between captures.

use super::PixelFormat;
use crate::detect::DetectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for camera capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Camera device index or identifier.
    pub device_id: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target frames per second delivered downstream.
    pub fps: u32,
    /// Pixel format requested from the device.
    pub format: PixelFormat,
    /// Upper zoom bound; zoom requests are clamped to [1.0, max_zoom].
    pub max_zoom: f64,
    /// Lock exposure and white balance at startup.
    pub lock_exposure: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Rgba8,
            max_zoom: 4.0,
            lock_exposure: true,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if !self.max_zoom.is_finite() || self.max_zoom < 1.0 {
            return Err(ConfigError::InvalidZoomBound);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Target frame rate outside the supported range.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Zoom bound below 1.0 or not finite.
    #[error("invalid zoom bound (must be >= 1.0)")]
    InvalidZoomBound,
    /// Detection constraint outside its valid range.
    #[error("invalid detection constraint: {0}")]
    InvalidConstraint(String),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file could not be parsed as TOML.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Demo run behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run until interrupted (true) or capture once and exit (false).
    pub continuous: bool,
    /// Frames to observe before requesting a capture.
    pub warmup_frames: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            warmup_frames: 30,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        config.detection.validate()?;
        Ok(config)
    }
}
