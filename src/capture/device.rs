//! Hardware camera backend built on `nokhwa`.
//!
//! Available behind the `camera` feature. Exposure and white balance
//! are pinned to their current values at open time when the
//! configuration requests a lock; drivers that do not expose those
//! controls degrade to a logged warning rather than a setup failure.

use super::{Camera, CameraError, CaptureConfig, Frame, PixelFormat};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, KnownCameraControl, RequestedFormat,
    RequestedFormatType, Resolution,
};
use std::time::Duration;

/// Camera implementation backed by a physical device.
pub struct HardwareCamera {
    inner: Option<nokhwa::Camera>,
    config: Option<CaptureConfig>,
    sequence: u64,
}

impl HardwareCamera {
    /// Creates an unopened hardware camera.
    pub fn new() -> Self {
        Self {
            inner: None,
            config: None,
            sequence: 0,
        }
    }

    fn lock_exposure_controls(camera: &mut nokhwa::Camera) {
        for control in [KnownCameraControl::Exposure, KnownCameraControl::WhiteBalance] {
            match camera.camera_control(control) {
                Ok(current) => {
                    let value = current.value();
                    if let Err(e) = camera.set_camera_control(control, value) {
                        tracing::warn!(?control, error = %e, "could not pin camera control");
                    }
                }
                Err(e) => {
                    tracing::debug!(?control, error = %e, "camera control not exposed by driver");
                }
            }
        }
    }
}

impl Default for HardwareCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera for HardwareCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let index = CameraIndex::Index(config.device_id);
        let wanted = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        let mut camera = nokhwa::Camera::new(index, requested)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        if config.lock_exposure {
            Self::lock_exposure_controls(&mut camera);
        }

        tracing::info!(
            device = config.device_id,
            format = %camera.camera_format(),
            "hardware camera opened"
        );
        self.inner = Some(camera);
        self.config = Some(config.clone());
        self.sequence = 0;
        Ok(())
    }

    fn capture(&mut self, timestamp: Duration) -> Result<Frame, CameraError> {
        let camera = self.inner.as_mut().ok_or(CameraError::NotInitialized)?;
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;

        let buffer = camera
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let (width, height) = decoded.dimensions();
        let rgb = decoded.into_raw();

        let pixels = match config.format {
            PixelFormat::Rgba8 => {
                let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
                for px in rgb.chunks_exact(3) {
                    rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                rgba
            }
            PixelFormat::Gray8 => rgb
                .chunks_exact(3)
                .map(|px| {
                    let y = 0.299 * f32::from(px[0])
                        + 0.587 * f32::from(px[1])
                        + 0.114 * f32::from(px[2]);
                    y.round().min(255.0) as u8
                })
                .collect(),
        };

        self.sequence += 1;
        Ok(Frame::new(
            pixels,
            width,
            height,
            config.format,
            timestamp,
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn set_zoom(&mut self, factor: f64) -> Result<f64, CameraError> {
        let camera = self.inner.as_mut().ok_or(CameraError::NotInitialized)?;
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        let clamped = factor.clamp(1.0, config.max_zoom);

        // Best effort: zoom control granularity is driver-specific.
        let raw = nokhwa::utils::ControlValueSetter::Integer((clamped * 100.0).round() as i64);
        if let Err(e) = camera.set_camera_control(KnownCameraControl::Zoom, raw) {
            tracing::debug!(error = %e, "zoom control not accepted by driver");
        }
        Ok(clamped)
    }

    fn focus_at(&mut self, x: f64, y: f64) -> Result<(), CameraError> {
        if self.inner.is_none() {
            return Err(CameraError::NotInitialized);
        }
        // Point-of-interest focus is not exposed by the backend; the
        // request is accepted and left to the device's autofocus.
        tracing::debug!(x, y, "focus request forwarded to device autofocus");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.inner.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!(error = %e, "failed to stop camera stream");
            }
        }
        self.config = None;
        tracing::info!("hardware camera closed");
    }
}
