//! Session lifecycle and pipeline orchestration.
//!
//! [`CaptureSession`] is the single owner of mutable capture state and its
//! Idle/Live/Frozen lifecycle. [`CapturePipeline`] wraps it with the frame
//! admission path, the single-inference gate, and the detection worker.

mod gate;
mod pipeline;
mod state;

pub use gate::{GatePermit, InferenceGate};
pub use pipeline::{CaptureError, CapturePipeline, DetectionSink};
pub use state::{CaptureSession, CaptureState};
