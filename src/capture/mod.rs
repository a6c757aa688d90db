//! Camera input and frame handling.
//!
//! This module provides abstractions for capturing frames from a camera,
//! managing camera configuration, and delivering frames downstream at a
//! bounded rate. The camera is treated as a source of raw image data;
//! detection and rectification live elsewhere.

mod camera;
mod config;
#[cfg(feature = "camera")]
mod device;
mod frame;
mod limiter;
mod source;

pub use camera::{Camera, CameraError, MockCamera, MockScene};
pub use config::{CaptureConfig, ConfigError, FileConfig, RunConfig};
#[cfg(feature = "camera")]
pub use device::HardwareCamera;
pub use frame::{Frame, PixelFormat};
pub use limiter::RateLimiter;
pub use source::{FrameSink, FrameSource};
