//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and mock implementations for testing.

use super::{CaptureConfig, Frame, PixelFormat};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for camera implementations.
///
/// This abstraction allows swapping between real camera hardware
/// and mock implementations for testing. Exposure and white balance
/// are locked during `open` when the configuration asks for it; the
/// lock is never revisited afterwards.
pub trait Camera {
    /// Opens and initializes the camera with the given configuration.
    ///
    /// Failure here is synchronous and fatal to the session: callers
    /// must not wire frame delivery when `open` reports an error.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Captures a single frame stamped with the given timestamp.
    fn capture(&mut self, timestamp: Duration) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Sets the zoom factor, clamped to `[1.0, max_zoom]`.
    ///
    /// Returns the factor actually applied.
    fn set_zoom(&mut self, factor: f64) -> Result<f64, CameraError>;

    /// Requests focus at a point in normalized `[0,1]` preview coordinates.
    fn focus_at(&mut self, x: f64, y: f64) -> Result<(), CameraError>;

    /// Closes the camera and releases resources.
    fn close(&mut self);
}

/// Synthetic scene rendered by [`MockCamera`].
#[derive(Debug, Clone, Copy)]
pub enum MockScene {
    /// Uniform background with nothing to detect.
    Blank,
    /// A filled rectangle on a lighter background, corners given as
    /// normalized `(x0, y0)`-`(x1, y1)` in top-left-origin coordinates.
    Rectangle {
        /// Left edge, normalized.
        x0: f64,
        /// Top edge, normalized.
        y0: f64,
        /// Right edge, normalized.
        x1: f64,
        /// Bottom edge, normalized.
        y1: f64,
    },
}

impl MockScene {
    /// A centered square covering roughly 40% of each dimension.
    pub fn centered_square() -> Self {
        MockScene::Rectangle {
            x0: 0.3,
            y0: 0.3,
            x1: 0.7,
            y1: 0.7,
        }
    }
}

/// Mock camera for testing that renders synthetic scenes.
#[derive(Debug)]
pub struct MockCamera {
    config: Option<CaptureConfig>,
    scene: MockScene,
    sequence: u64,
    zoom: f64,
    last_focus: Option<(f64, f64)>,
}

impl MockCamera {
    /// Creates a mock camera showing a blank scene.
    pub fn new() -> Self {
        Self::with_scene(MockScene::Blank)
    }

    /// Creates a mock camera showing the given scene.
    pub fn with_scene(scene: MockScene) -> Self {
        Self {
            config: None,
            scene,
            sequence: 0,
            zoom: 1.0,
            last_focus: None,
        }
    }

    /// Returns the current zoom factor.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Returns the most recent focus request, if any.
    pub fn last_focus(&self) -> Option<(f64, f64)> {
        self.last_focus
    }

    fn render(&self, config: &CaptureConfig) -> Vec<u8> {
        const BACKGROUND: u8 = 210;
        const FOREGROUND: u8 = 40;

        let width = config.width as usize;
        let height = config.height as usize;
        let mut luma = vec![BACKGROUND; width * height];

        if let MockScene::Rectangle { x0, y0, x1, y1 } = self.scene {
            let px0 = (x0 * width as f64).round().max(0.0) as usize;
            let py0 = (y0 * height as f64).round().max(0.0) as usize;
            let px1 = ((x1 * width as f64).round() as usize).min(width);
            let py1 = ((y1 * height as f64).round() as usize).min(height);
            for y in py0..py1 {
                for x in px0..px1 {
                    luma[y * width + x] = FOREGROUND;
                }
            }
        }

        match config.format {
            PixelFormat::Gray8 => luma,
            PixelFormat::Rgba8 => {
                let mut rgba = Vec::with_capacity(luma.len() * 4);
                for v in luma {
                    rgba.extend_from_slice(&[v, v, v, 255]);
                }
                rgba
            }
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::info!(?config, "MockCamera opened");
        Ok(())
    }

    fn capture(&mut self, timestamp: Duration) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        let pixels = self.render(config);

        self.sequence += 1;
        Ok(Frame::new(
            pixels,
            config.width,
            config.height,
            config.format,
            timestamp,
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn set_zoom(&mut self, factor: f64) -> Result<f64, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        self.zoom = factor.clamp(1.0, config.max_zoom);
        Ok(self.zoom)
    }

    fn focus_at(&mut self, x: f64, y: f64) -> Result<(), CameraError> {
        if !self.is_open() {
            return Err(CameraError::NotInitialized);
        }
        self.last_focus = Some((x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)));
        Ok(())
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!("MockCamera closed");
    }
}
