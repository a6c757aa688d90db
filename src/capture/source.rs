//! Push-stream frame delivery.
//!
//! [`FrameSource`] owns a [`Camera`] and a delivery thread that captures
//! frames, gates them through a [`RateLimiter`], and pushes survivors to
//! an attached [`FrameSink`]. Delivery is serial: the sink is never
//! called concurrently with itself.

use super::{Camera, CameraError, CaptureConfig, Frame, RateLimiter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Receives frames pushed by a [`FrameSource`].
///
/// Injected at wiring time; the source holds no other knowledge of its
/// consumer.
pub trait FrameSink: Send + Sync {
    /// Called serially for every delivered frame.
    fn on_frame(&self, frame: Frame);
}

struct SourceInner {
    camera: Mutex<Box<dyn Camera + Send>>,
    config: CaptureConfig,
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    running: AtomicBool,
    epoch: Instant,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Camera frame source with idempotent start/stop.
///
/// Cloning yields another handle to the same source.
#[derive(Clone)]
pub struct FrameSource {
    inner: Arc<SourceInner>,
}

impl FrameSource {
    /// Opens the camera and prepares the source.
    ///
    /// Setup failure is reported synchronously; no delivery thread is
    /// created and no sink will ever be called.
    pub fn new(
        mut camera: Box<dyn Camera + Send>,
        config: CaptureConfig,
    ) -> Result<Self, CameraError> {
        camera.open(&config)?;
        tracing::info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            lock_exposure = config.lock_exposure,
            "frame source ready"
        );
        Ok(Self {
            inner: Arc::new(SourceInner {
                camera: Mutex::new(camera),
                config,
                sink: Mutex::new(None),
                running: AtomicBool::new(false),
                epoch: Instant::now(),
                thread: Mutex::new(None),
            }),
        })
    }

    /// Attaches the sink that receives delivered frames.
    pub fn attach(&self, sink: Arc<dyn FrameSink>) {
        *self.inner.sink.lock().unwrap() = Some(sink);
    }

    /// Returns the capture configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }

    /// Returns true if the delivery thread is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Starts frame delivery. No-op if already running.
    pub fn start(&self) {
        let mut thread = self.inner.thread.lock().unwrap();
        if self.inner.running.load(Ordering::SeqCst) {
            return;
        }
        // Reap the previous delivery thread before spawning another.
        if let Some(handle) = thread.take() {
            let _ = handle.join();
        }
        self.inner.running.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        *thread = Some(std::thread::spawn(move || deliver_loop(inner)));
        tracing::info!("frame delivery started");
    }

    /// Stops frame delivery. No-op if already stopped.
    ///
    /// Safe to call from any thread, including mid-detection; the
    /// delivery thread exits on its next iteration.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            tracing::info!("frame delivery stopping");
        }
    }

    /// Stops delivery, joins the thread, and closes the camera.
    pub fn shutdown(&self) {
        self.stop();
        if let Some(handle) = self.inner.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.inner.camera.lock().unwrap().close();
    }

    /// Sets the camera zoom factor, clamped to the device bound.
    pub fn set_zoom(&self, factor: f64) -> Result<f64, CameraError> {
        self.inner.camera.lock().unwrap().set_zoom(factor)
    }

    /// Requests focus at normalized preview coordinates.
    pub fn focus_at(&self, x: f64, y: f64) -> Result<(), CameraError> {
        self.inner.camera.lock().unwrap().focus_at(x, y)
    }
}

fn deliver_loop(inner: Arc<SourceInner>) {
    let mut limiter = RateLimiter::new(inner.config.fps);

    while inner.running.load(Ordering::SeqCst) {
        let timestamp = inner.epoch.elapsed();
        let captured = inner.camera.lock().unwrap().capture(timestamp);

        match captured {
            Ok(frame) => {
                if limiter.admit(timestamp) {
                    let sink = inner.sink.lock().unwrap().clone();
                    if let Some(sink) = sink {
                        sink.on_frame(frame);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed");
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }
    tracing::debug!("frame delivery stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCamera;

    struct CollectingSink {
        frames: Mutex<Vec<Frame>>,
    }

    impl CollectingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }
    }

    impl FrameSink for CollectingSink {
        fn on_frame(&self, frame: Frame) {
            self.frames.lock().unwrap().push(frame);
        }
    }

    fn test_source(fps: u32) -> FrameSource {
        let mut config = CaptureConfig::with_dimensions(32, 32);
        config.fps = fps;
        FrameSource::new(Box::new(MockCamera::new()), config).unwrap()
    }

    #[test]
    fn test_setup_failure_reported_synchronously() {
        let config = CaptureConfig::with_dimensions(0, 0);
        assert!(FrameSource::new(Box::new(MockCamera::new()), config).is_err());
    }

    #[test]
    fn test_delivers_frames_to_sink() {
        let source = test_source(120);
        let sink = CollectingSink::new();
        source.attach(sink.clone());

        source.start();
        std::thread::sleep(Duration::from_millis(100));
        source.shutdown();

        let frames = sink.frames.lock().unwrap();
        assert!(!frames.is_empty());
        // Serial delivery: sequences strictly increase.
        for pair in frames.windows(2) {
            assert!(pair[1].sequence() > pair[0].sequence());
        }
    }

    #[test]
    fn test_delivery_respects_target_rate() {
        let source = test_source(30);
        let sink = CollectingSink::new();
        source.attach(sink.clone());

        source.start();
        std::thread::sleep(Duration::from_millis(150));
        source.shutdown();

        let frames = sink.frames.lock().unwrap();
        let min = Duration::from_nanos(1_000_000_000 / 30);
        for pair in frames.windows(2) {
            assert!(pair[1].timestamp() - pair[0].timestamp() >= min);
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        let source = test_source(60);
        source.attach(CollectingSink::new());

        source.start();
        source.start(); // no-op
        assert!(source.is_running());

        source.stop();
        source.stop(); // no-op
        assert!(!source.is_running());

        source.shutdown();
    }

    #[test]
    fn test_restart_after_stop() {
        let source = test_source(120);
        let sink = CollectingSink::new();
        source.attach(sink.clone());

        source.start();
        std::thread::sleep(Duration::from_millis(30));
        source.stop();
        let after_stop = sink.frames.lock().unwrap().len();

        source.start();
        std::thread::sleep(Duration::from_millis(50));
        source.shutdown();

        assert!(sink.frames.lock().unwrap().len() > after_stop);
    }
}
