//! Pipeline orchestration: wires the frame source, detection oracle,
//! rectifier, and capture state machine together.
//!
//! The pipeline owns a single detection worker thread fed over a channel.
//! Frames arrive on the source's delivery thread; admission to the worker
//! is controlled by the inference gate, so at most one detection runs at a
//! time and surplus frames are dropped rather than queued. All session
//! mutation happens under the session mutex, which keeps state transitions,
//! quad recording, and capture consumption serialized regardless of which
//! thread observes a result.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::capture::{Frame, FrameSink, FrameSource};
use crate::detect::{DetectionOracle, OverlayRect, Quad};
use crate::rectify::{RectifiedImage, Rectifier, RectifyError};
use crate::session::gate::{GatePermit, InferenceGate};
use crate::session::state::{CaptureSession, CaptureState};

/// Errors surfaced by explicit pipeline operations.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// A capture was requested while the session was not live.
    #[error("capture requires a live session (state is {0:?})")]
    NotLive(CaptureState),
    /// A capture was requested before any frame had been delivered.
    #[error("no frame has been delivered yet")]
    NoFrame,
}

/// Receiver for detection and capture outcomes.
///
/// Callbacks are invoked from the detection worker thread while the session
/// lock is held, so implementations must not call back into the pipeline.
pub trait DetectionSink: Send + Sync {
    /// A rectangle was found; `rect` is its axis-aligned bounding box in
    /// top-left-origin preview pixel coordinates.
    fn on_detection(&self, rect: OverlayRect);

    /// A requested capture completed and the session froze on `still`.
    fn on_still(&self, still: &RectifiedImage);

    /// A requested capture failed during rectification. The session stays
    /// live and the request must be re-issued.
    fn on_rectification_failed(&self, error: &RectifyError) {
        let _ = error;
    }

    /// The session restarted; any displayed overlay should be removed.
    fn on_overlay_cleared(&self) {}
}

/// One unit of work for the detection worker. The gate permit travels with
/// the job so the gate stays held until the result has been applied; the
/// epoch identifies which session generation submitted the frame.
struct DetectJob {
    frame: Frame,
    epoch: u64,
    permit: GatePermit,
}

struct Shared {
    session: Mutex<CaptureSession>,
    gate: InferenceGate,
    sink: Arc<dyn DetectionSink>,
    rectifier: Rectifier,
    source: Mutex<Option<FrameSource>>,
}

/// Live capture pipeline: frame admission, detection dispatch, and the
/// capture state machine behind one handle.
pub struct CapturePipeline {
    shared: Arc<Shared>,
    jobs: Mutex<Option<mpsc::Sender<DetectJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CapturePipeline {
    /// Builds an idle pipeline and spawns its detection worker.
    pub fn new(oracle: Arc<dyn DetectionOracle>, sink: Arc<dyn DetectionSink>) -> Arc<Self> {
        let shared = Arc::new(Shared {
            session: Mutex::new(CaptureSession::new()),
            gate: InferenceGate::new(),
            sink,
            rectifier: Rectifier::new(),
            source: Mutex::new(None),
        });

        let (tx, rx) = mpsc::channel::<DetectJob>();
        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            while let Ok(job) = rx.recv() {
                Self::run_detection(&worker_shared, &*oracle, job);
            }
            debug!("detection worker exiting");
        });

        Arc::new(Self {
            shared,
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Attaches a frame source and moves the session to live.
    ///
    /// The pipeline must already be registered as the source's sink via
    /// [`FrameSource::attach`].
    pub fn activate(&self, source: FrameSource) {
        *self.shared.source.lock().unwrap() = Some(source.clone());
        self.shared.session.lock().unwrap().begin();
        source.start();
        info!("pipeline active");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaptureState {
        self.shared.session.lock().unwrap().state()
    }

    /// The still held by a frozen session, if any.
    pub fn captured_still(&self) -> Option<RectifiedImage> {
        self.shared.session.lock().unwrap().still().cloned()
    }

    /// The most recent detected quad, if any.
    pub fn last_quad(&self) -> Option<Quad> {
        self.shared.session.lock().unwrap().last_quad().copied()
    }

    /// Arms a one-shot capture: the next successful detection will be
    /// rectified and the session frozen on the result.
    ///
    /// If the gate is free the most recent frame is submitted immediately so
    /// the capture does not have to wait for the next delivered frame.
    pub fn request_capture(&self) -> Result<(), CaptureError> {
        let (frame, epoch) = {
            let mut session = self.shared.session.lock().unwrap();
            match session.state() {
                CaptureState::Live => {}
                other => return Err(CaptureError::NotLive(other)),
            }
            let frame = session.last_frame().cloned().ok_or(CaptureError::NoFrame)?;
            session.arm_capture();
            (frame, session.epoch())
        };
        // Best effort: if a detection is already in flight it will consume
        // the armed flag itself.
        if let Some(permit) = self.shared.gate.try_acquire() {
            self.submit(DetectJob { frame, epoch, permit });
        }
        Ok(())
    }

    /// Clears the still, quad, and overlay and resumes frame delivery.
    /// Legal from frozen or live; a no-op while idle. A detection in
    /// flight becomes stale and its result is discarded when it lands.
    pub fn restart(&self) {
        {
            let mut session = self.shared.session.lock().unwrap();
            if session.state() == CaptureState::Idle {
                return;
            }
            session.restart();
        }
        self.shared.sink.on_overlay_cleared();
        if let Some(source) = self.shared.source.lock().unwrap().as_ref() {
            source.start();
        }
    }

    /// Tears the pipeline down: stops the source, drains the worker, and
    /// returns the session to idle. Idempotent.
    pub fn shutdown(&self) {
        self.shared.session.lock().unwrap().teardown();
        let source = self.shared.source.lock().unwrap().take();
        if let Some(source) = source {
            source.shutdown();
        }
        // Dropping the sender ends the worker's recv loop.
        self.jobs.lock().unwrap().take();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("pipeline shut down");
    }

    fn submit(&self, job: DetectJob) {
        if let Some(tx) = self.jobs.lock().unwrap().as_ref() {
            if tx.send(job).is_err() {
                warn!("detection worker gone; dropping frame");
            }
        }
    }

    /// Worker-side handling of one frame. The permit inside `job` is
    /// released when the job drops at the end of this call.
    fn run_detection(shared: &Shared, oracle: &dyn DetectionOracle, job: DetectJob) {
        let detection = oracle.detect(&job.frame);

        let mut session = shared.session.lock().unwrap();
        if session.state() == CaptureState::Idle || session.epoch() != job.epoch {
            // Torn down or restarted while the detection ran; the result
            // belongs to a frame the session no longer knows about.
            return;
        }
        let quad = match detection {
            Some(quad) => quad,
            // A miss mutates nothing: the previous overlay and quad stand.
            None => return,
        };

        session.record_quad(quad);
        shared
            .sink
            .on_detection(quad.overlay_rect(f64::from(job.frame.width()), f64::from(job.frame.height())));

        if session.take_capture_request() {
            match shared.rectifier.rectify(&job.frame, &quad) {
                Ok(still) => {
                    session.freeze(still);
                    if let Some(source) = shared.source.lock().unwrap().as_ref() {
                        source.stop();
                    }
                    if let Some(still) = session.still() {
                        shared.sink.on_still(still);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "rectification failed; session stays live");
                    shared.sink.on_rectification_failed(&err);
                }
            }
        }
    }
}

impl FrameSink for CapturePipeline {
    /// Called on the source's delivery thread for each rate-admitted frame.
    fn on_frame(&self, frame: Frame) {
        let epoch = {
            let mut session = self.shared.session.lock().unwrap();
            if session.state() != CaptureState::Live {
                return;
            }
            session.record_frame(frame.clone());
            session.epoch()
        };
        match self.shared.gate.try_acquire() {
            Some(permit) => self.submit(DetectJob { frame, epoch, permit }),
            // Load shedding: a detection is in flight, drop this frame.
            None => trace!(sequence = frame.sequence(), "gate busy; frame dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::capture::{CaptureConfig, MockCamera, MockScene, PixelFormat};
    use crate::detect::{DetectionConfig, Point, Quad, RectangleDetector};

    /// Sink that counts callbacks and remembers the last overlay.
    #[derive(Default)]
    struct RecordingSink {
        detections: AtomicUsize,
        stills: AtomicUsize,
        failures: AtomicUsize,
        clears: AtomicUsize,
        last_rect: Mutex<Option<OverlayRect>>,
    }

    impl DetectionSink for RecordingSink {
        fn on_detection(&self, rect: OverlayRect) {
            self.detections.fetch_add(1, Ordering::SeqCst);
            *self.last_rect.lock().unwrap() = Some(rect);
        }

        fn on_still(&self, _still: &RectifiedImage) {
            self.stills.fetch_add(1, Ordering::SeqCst);
        }

        fn on_rectification_failed(&self, _error: &RectifyError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        fn on_overlay_cleared(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Oracle that counts invocations and always reports a fixed quad.
    struct CountingOracle {
        calls: Arc<AtomicUsize>,
        result: Option<Quad>,
    }

    impl DetectionOracle for CountingOracle {
        fn detect(&self, _frame: &Frame) -> Option<Quad> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    /// Oracle whose detection outlives a restart issued mid-flight.
    struct SlowOracle {
        delay: Duration,
        result: Option<Quad>,
    }

    impl DetectionOracle for SlowOracle {
        fn detect(&self, _frame: &Frame) -> Option<Quad> {
            thread::sleep(self.delay);
            self.result
        }
    }

    fn unit_quad() -> Quad {
        Quad::new(
            Point::new(0.2, 0.8),
            Point::new(0.8, 0.8),
            Point::new(0.8, 0.2),
            Point::new(0.2, 0.2),
        )
    }

    fn gray_frame(seq: u64) -> Frame {
        Frame::new(
            vec![128; 16 * 16],
            16,
            16,
            PixelFormat::Gray8,
            Duration::from_millis(seq * 33),
            seq,
        )
    }

    fn test_source(format: PixelFormat) -> FrameSource {
        let config = CaptureConfig {
            width: 96,
            height: 96,
            fps: 60,
            format,
            ..CaptureConfig::default()
        };
        let camera = MockCamera::with_scene(MockScene::centered_square());
        FrameSource::new(Box::new(camera), config).unwrap()
    }

    #[test]
    fn test_capture_before_activation_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(CountingOracle { calls, result: Some(unit_quad()) });
        let pipeline = CapturePipeline::new(oracle, Arc::new(RecordingSink::default()));

        assert!(matches!(
            pipeline.request_capture(),
            Err(CaptureError::NotLive(CaptureState::Idle))
        ));
        pipeline.shutdown();
    }

    #[test]
    fn test_capture_without_frame_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(CountingOracle { calls, result: Some(unit_quad()) });
        let pipeline = CapturePipeline::new(oracle, Arc::new(RecordingSink::default()));

        // Activate with a source but never deliver a frame.
        let source = test_source(PixelFormat::Gray8);
        pipeline.shared.session.lock().unwrap().begin();
        *pipeline.shared.source.lock().unwrap() = Some(source);

        assert!(matches!(pipeline.request_capture(), Err(CaptureError::NoFrame)));
        assert_eq!(pipeline.state(), CaptureState::Live);
        assert!(!pipeline.shared.session.lock().unwrap().capture_armed());
        pipeline.shutdown();
    }

    #[test]
    fn test_detection_updates_quad_and_overlay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(CountingOracle {
            calls: Arc::clone(&calls),
            result: Some(unit_quad()),
        });
        let sink = Arc::new(RecordingSink::default());
        let pipeline = CapturePipeline::new(oracle, Arc::clone(&sink) as Arc<dyn DetectionSink>);
        pipeline.shared.session.lock().unwrap().begin();

        pipeline.on_frame(gray_frame(0));
        // The worker owns the job now; wait for it to land.
        for _ in 0..200 {
            if pipeline.last_quad().is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(pipeline.last_quad(), Some(unit_quad()));
        assert_eq!(sink.detections.load(Ordering::SeqCst), 1);
        let rect = sink.last_rect.lock().unwrap().unwrap();
        // Normalized (0.2, 0.2)..(0.8, 0.8) in a 16x16 frame, y flipped.
        assert!((rect.x - 3.2).abs() < 1e-9);
        assert!((rect.width - 9.6).abs() < 1e-9);
        pipeline.shutdown();
    }

    #[test]
    fn test_miss_leaves_previous_detection_in_place() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(CountingOracle {
            calls: Arc::clone(&calls),
            result: None,
        });
        let sink = Arc::new(RecordingSink::default());
        let pipeline = CapturePipeline::new(oracle, Arc::clone(&sink) as Arc<dyn DetectionSink>);
        pipeline.shared.session.lock().unwrap().begin();
        pipeline.shared.session.lock().unwrap().record_quad(unit_quad());

        pipeline.on_frame(gray_frame(0));
        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) == 1 && !pipeline.shared.gate.is_busy() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(pipeline.last_quad(), Some(unit_quad()));
        assert_eq!(sink.detections.load(Ordering::SeqCst), 0);
        pipeline.shutdown();
    }

    #[test]
    fn test_gate_admits_one_detection_at_a_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(CountingOracle {
            calls: Arc::clone(&calls),
            result: None,
        });
        let pipeline = CapturePipeline::new(oracle, Arc::new(RecordingSink::default()));
        pipeline.shared.session.lock().unwrap().begin();

        // Hold the gate so every delivered frame is shed.
        let permit = pipeline.shared.gate.try_acquire().unwrap();
        for seq in 0..20 {
            pipeline.on_frame(gray_frame(seq));
        }
        thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(permit);

        pipeline.on_frame(gray_frame(20));
        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        pipeline.shutdown();
    }

    #[test]
    fn test_end_to_end_capture_freezes_with_still() {
        let detector = RectangleDetector::new(DetectionConfig::default());
        let sink = Arc::new(RecordingSink::default());
        let pipeline = CapturePipeline::new(
            Arc::new(detector),
            Arc::clone(&sink) as Arc<dyn DetectionSink>,
        );

        let source = test_source(PixelFormat::Gray8);
        source.attach(Arc::clone(&pipeline) as Arc<dyn FrameSink>);
        pipeline.activate(source);

        // Wait for the first detection, then request the capture.
        for _ in 0..400 {
            if pipeline.last_quad().is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(pipeline.last_quad().is_some(), "detection never fired");
        pipeline.request_capture().unwrap();

        for _ in 0..400 {
            if pipeline.state() == CaptureState::Frozen {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pipeline.state(), CaptureState::Frozen);
        let still = pipeline.captured_still().expect("frozen without a still");
        assert!(still.width() > 0 && still.height() > 0);
        assert_eq!(sink.stills.load(Ordering::SeqCst), 1);

        // Restart resumes live preview and clears the still and overlay.
        pipeline.restart();
        assert_eq!(pipeline.state(), CaptureState::Live);
        assert!(pipeline.captured_still().is_none());
        assert_eq!(sink.clears.load(Ordering::SeqCst), 1);

        pipeline.shutdown();
        assert_eq!(pipeline.state(), CaptureState::Idle);
    }

    #[test]
    fn test_restart_discards_in_flight_detection() {
        let sink = Arc::new(RecordingSink::default());
        let oracle = Arc::new(SlowOracle {
            delay: Duration::from_millis(80),
            result: Some(unit_quad()),
        });
        let pipeline = CapturePipeline::new(oracle, Arc::clone(&sink) as Arc<dyn DetectionSink>);
        pipeline.shared.session.lock().unwrap().begin();

        // Start a detection, then restart while the oracle is still working.
        pipeline.on_frame(gray_frame(0));
        thread::sleep(Duration::from_millis(20));
        pipeline.restart();
        assert!(pipeline.last_quad().is_none());

        // Arm a capture after the restart; the stale result must not
        // consume it or freeze on the pre-restart frame.
        pipeline.request_capture().unwrap();

        // Wait out the detection and the window in which a stale result
        // could be applied.
        for _ in 0..200 {
            if !pipeline.shared.gate.is_busy() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(20));

        assert!(pipeline.last_quad().is_none());
        assert_eq!(sink.detections.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.state(), CaptureState::Live);
        assert!(pipeline.captured_still().is_none());
        assert!(pipeline.shared.session.lock().unwrap().capture_armed());
        pipeline.shutdown();
    }

    #[test]
    fn test_late_result_after_teardown_discarded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(CountingOracle {
            calls: Arc::clone(&calls),
            result: Some(unit_quad()),
        });
        let sink = Arc::new(RecordingSink::default());
        let pipeline = CapturePipeline::new(oracle, Arc::clone(&sink) as Arc<dyn DetectionSink>);
        pipeline.shared.session.lock().unwrap().begin();

        // Tear the session down before the worker gets scheduled, then feed
        // a job directly; the result must not reach the sink.
        pipeline.shared.session.lock().unwrap().teardown();
        let permit = pipeline.shared.gate.try_acquire().unwrap();
        pipeline.submit(DetectJob { frame: gray_frame(0), epoch: 0, permit });

        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.detections.load(Ordering::SeqCst), 0);
        assert!(pipeline.last_quad().is_none());
        pipeline.shutdown();
    }
}
