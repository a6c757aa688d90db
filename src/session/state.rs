//! Capture session state.
//!
//! All mutable per-session fields live here and change only through
//! the transition methods; callers never poke fields directly. The
//! pipeline serializes access with a single lock, which is the
//! designated coordination context for detection results.

use crate::capture::Frame;
use crate::detect::Quad;
use crate::rectify::RectifiedImage;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// No active session: before setup completes or after teardown.
    #[default]
    Idle,
    /// Preview running, continuous detection active, no still held.
    Live,
    /// Preview paused after a capture; a still is current.
    Frozen,
}

/// Mutable state owned by the capture state machine.
#[derive(Debug, Default)]
pub struct CaptureSession {
    state: CaptureState,
    /// Bumped by restart and teardown; detection results computed
    /// against an older epoch are stale and must be discarded.
    epoch: u64,
    last_frame: Option<Frame>,
    last_quad: Option<Quad>,
    last_still: Option<RectifiedImage>,
    /// One-shot flag set by a capture request and consumed by the next
    /// successful detection.
    pending_capture: bool,
}

impl CaptureSession {
    /// Creates an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Returns the current session epoch.
    ///
    /// A result stamped with an earlier epoch was computed from a frame
    /// that predates a restart or teardown.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Idle → Live, after successful frame source setup.
    pub fn begin(&mut self) {
        self.state = CaptureState::Live;
        tracing::info!("session live");
    }

    /// Records the most recent delivered frame.
    ///
    /// Only meaningful while live; frames arriving in other states are
    /// ignored by the pipeline.
    pub fn record_frame(&mut self, frame: Frame) {
        self.last_frame = Some(frame);
    }

    /// Returns the most recent frame, if any.
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Records a detection result.
    pub fn record_quad(&mut self, quad: Quad) {
        self.last_quad = Some(quad);
    }

    /// Returns the most recent detection, if any.
    pub fn last_quad(&self) -> Option<&Quad> {
        self.last_quad.as_ref()
    }

    /// Arms the one-shot capture flag.
    pub fn arm_capture(&mut self) {
        self.pending_capture = true;
    }

    /// Consumes the one-shot capture flag.
    ///
    /// Returns true exactly once per arm; the flag guarantees that the
    /// captured still reflects a boundary detected at or after the
    /// moment of request.
    pub fn take_capture_request(&mut self) -> bool {
        std::mem::take(&mut self.pending_capture)
    }

    /// True if a capture request is armed.
    pub fn capture_armed(&self) -> bool {
        self.pending_capture
    }

    /// Live → Frozen with the freshly rectified still.
    pub fn freeze(&mut self, still: RectifiedImage) {
        self.last_still = Some(still);
        self.state = CaptureState::Frozen;
        tracing::info!("session frozen with captured still");
    }

    /// Returns the current still, if any.
    pub fn still(&self) -> Option<&RectifiedImage> {
        self.last_still.as_ref()
    }

    /// Frozen (or Live) → Live, clearing all capture artifacts.
    ///
    /// Advances the epoch so detections still in flight against
    /// pre-restart frames can never land afterwards.
    pub fn restart(&mut self) {
        self.epoch += 1;
        self.last_quad = None;
        self.last_still = None;
        self.pending_capture = false;
        self.state = CaptureState::Live;
        tracing::info!(epoch = self.epoch, "session restarted");
    }

    /// Any state → Idle, releasing all held frames and stills.
    pub fn teardown(&mut self) {
        self.epoch += 1;
        self.last_frame = None;
        self.last_quad = None;
        self.last_still = None;
        self.pending_capture = false;
        self.state = CaptureState::Idle;
        tracing::info!("session torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use crate::detect::Point;
    use std::time::Duration;

    fn dummy_frame() -> Frame {
        Frame::new(vec![0u8; 16], 4, 4, PixelFormat::Gray8, Duration::ZERO, 1)
    }

    fn dummy_quad() -> Quad {
        Quad::new(
            Point::new(0.2, 0.8),
            Point::new(0.8, 0.8),
            Point::new(0.8, 0.2),
            Point::new(0.2, 0.2),
        )
    }

    #[test]
    fn test_starts_idle() {
        assert_eq!(CaptureSession::new().state(), CaptureState::Idle);
    }

    #[test]
    fn test_capture_flag_is_one_shot() {
        let mut session = CaptureSession::new();
        session.begin();

        assert!(!session.take_capture_request());
        session.arm_capture();
        assert!(session.take_capture_request());
        assert!(!session.take_capture_request());
    }

    #[test]
    fn test_restart_clears_artifacts() {
        let mut session = CaptureSession::new();
        session.begin();
        session.record_frame(dummy_frame());
        session.record_quad(dummy_quad());
        session.arm_capture();

        session.restart();
        assert_eq!(session.state(), CaptureState::Live);
        assert!(session.last_quad().is_none());
        assert!(session.still().is_none());
        assert!(!session.capture_armed());
        // The last frame survives restart; only capture artifacts clear.
        assert!(session.last_frame().is_some());
    }

    #[test]
    fn test_restart_and_teardown_advance_epoch() {
        let mut session = CaptureSession::new();
        session.begin();
        assert_eq!(session.epoch(), 0);
        session.restart();
        assert_eq!(session.epoch(), 1);
        session.teardown();
        assert_eq!(session.epoch(), 2);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut session = CaptureSession::new();
        session.begin();
        session.record_frame(dummy_frame());
        session.record_quad(dummy_quad());

        session.teardown();
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.last_frame().is_none());
        assert!(session.last_quad().is_none());
    }
}
