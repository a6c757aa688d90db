//! Assay Capture Library
//!
//! A live capture pipeline for photographing rectangular test strips:
//! camera frames are rate-limited, scanned for a dominant rectangle, and on
//! request rectified into a flat, perspective-corrected still.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! camera → rate limiter → inference gate → detection → rectification
//!                              ↓               ↓            ↓
//!                         (frame shed)   overlay sink   frozen still
//! ```
//!
//! # Design Principles
//!
//! - **Load shedding over queueing**: at most one detection runs at a time;
//!   frames arriving while it runs are dropped, never buffered
//! - **Single state owner**: all session mutation goes through one
//!   [`session::CaptureSession`] behind one lock
//! - **No mutation on miss**: a frame with no detected rectangle leaves the
//!   previous overlay and quad untouched
//! - **Deterministic rectification**: same frame and quad, same output bytes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use assay_capture::{
//!     capture::{CaptureConfig, FrameSink, FrameSource, MockCamera, MockScene},
//!     detect::{DetectionConfig, RectangleDetector},
//!     session::{CapturePipeline, CaptureState, DetectionSink},
//! };
//!
//! struct NullSink;
//! impl DetectionSink for NullSink {
//!     fn on_detection(&self, _rect: assay_capture::detect::OverlayRect) {}
//!     fn on_still(&self, _still: &assay_capture::rectify::RectifiedImage) {}
//! }
//!
//! // Wire the pipeline to a mock camera showing a centered square.
//! let detector = RectangleDetector::new(DetectionConfig::default());
//! let pipeline = CapturePipeline::new(Arc::new(detector), Arc::new(NullSink));
//!
//! let camera = MockCamera::with_scene(MockScene::centered_square());
//! let source = FrameSource::new(Box::new(camera), CaptureConfig::default()).unwrap();
//! source.attach(Arc::clone(&pipeline) as Arc<dyn FrameSink>);
//! pipeline.activate(source);
//!
//! // Once a rectangle has been seen, freeze on a rectified still.
//! while pipeline.last_quad().is_none() {
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! pipeline.request_capture().unwrap();
//! while pipeline.state() != CaptureState::Frozen {
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! let still = pipeline.captured_still().unwrap();
//! println!("captured {}x{}", still.width(), still.height());
//! pipeline.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod detect;
pub mod rectify;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{Camera, CaptureConfig, Frame, FrameSink, FrameSource, MockCamera, RateLimiter};
pub use detect::{DetectionConfig, DetectionOracle, OverlayRect, Quad, RectangleDetector};
pub use rectify::{RectifiedImage, Rectifier};
pub use session::{CaptureError, CapturePipeline, CaptureSession, CaptureState, DetectionSink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
