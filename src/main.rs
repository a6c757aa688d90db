//! Assay Capture CLI
//!
//! Command-line interface for testing and demonstrating the capture,
//! detection, and rectification pipeline.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};

use assay_capture::{
    capture::{CaptureConfig, FileConfig, FrameSink, FrameSource, MockCamera, MockScene},
    detect::{OverlayRect, RectangleDetector},
    rectify::{RectifiedImage, RectifyError},
    session::{CapturePipeline, CaptureState, DetectionSink},
};

#[derive(Parser, Debug)]
#[command(name = "assay-capture", version, about = "Assay strip capture pipeline demo")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep capturing: restart after each still until interrupted
    #[arg(long)]
    continuous: bool,

    /// Seconds to wait for a detection before giving up
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Use the first hardware camera instead of the built-in mock scene
    #[cfg(feature = "camera")]
    #[arg(long)]
    hardware: bool,
}

/// Sink that reports pipeline events on the log.
struct ConsoleSink;

impl DetectionSink for ConsoleSink {
    fn on_detection(&self, rect: OverlayRect) {
        info!(
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            "rectangle detected"
        );
    }

    fn on_still(&self, still: &RectifiedImage) {
        info!(width = still.width(), height = still.height(), "still captured");
    }

    fn on_rectification_failed(&self, error: &RectifyError) {
        warn!(%error, "rectification failed");
    }

    fn on_overlay_cleared(&self) {
        info!("overlay cleared");
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    info!("Assay Capture v{}", assay_capture::VERSION);

    let file = match &cli.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    let (capture_config, detection_config, run) = (file.capture, file.detection, file.run);
    let continuous = cli.continuous || run.continuous;

    let fps = capture_config.fps.max(1);
    let detector = RectangleDetector::new(detection_config);
    let pipeline = CapturePipeline::new(Arc::new(detector), Arc::new(ConsoleSink));

    let source = match open_source(&cli, capture_config) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to open camera: {}", e);
            std::process::exit(1);
        }
    };
    source.attach(Arc::clone(&pipeline) as Arc<dyn FrameSink>);
    pipeline.activate(source);

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    }) {
        warn!("failed to install interrupt handler: {}", e);
    }

    // Let exposure settle before the first capture request.
    let warmup = Duration::from_millis(u64::from(run.warmup_frames) * 1000 / u64::from(fps));
    std::thread::sleep(warmup);

    let timeout = Duration::from_secs(cli.timeout);
    let mut captures = 0usize;

    loop {
        match capture_once(&pipeline, &running, timeout) {
            Some(still) => {
                captures += 1;
                println!(
                    "Rectified still #{}: {}x{} ({} bytes)",
                    captures,
                    still.width(),
                    still.height(),
                    still.pixels().len()
                );
            }
            None => {
                if running.load(Ordering::SeqCst) {
                    warn!("no rectangle detected within {}s", cli.timeout);
                }
                break;
            }
        }

        if !continuous || !running.load(Ordering::SeqCst) {
            break;
        }
        pipeline.restart();
    }

    pipeline.shutdown();
    info!("Done. {} capture(s) completed", captures);
}

/// Waits for a detection, requests the capture, and waits for the freeze.
fn capture_once(
    pipeline: &CapturePipeline,
    running: &AtomicBool,
    timeout: Duration,
) -> Option<RectifiedImage> {
    let deadline = Instant::now() + timeout;

    while pipeline.last_quad().is_none() {
        if !running.load(Ordering::SeqCst) || Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    if let Err(e) = pipeline.request_capture() {
        warn!("capture request rejected: {}", e);
        return None;
    }

    while pipeline.state() != CaptureState::Frozen {
        if !running.load(Ordering::SeqCst) || Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    pipeline.captured_still()
}

#[cfg(feature = "camera")]
fn open_source(
    cli: &Cli,
    config: CaptureConfig,
) -> Result<FrameSource, assay_capture::capture::CameraError> {
    if cli.hardware {
        let camera = assay_capture::capture::HardwareCamera::new();
        return FrameSource::new(Box::new(camera), config);
    }
    let camera = MockCamera::with_scene(MockScene::centered_square());
    FrameSource::new(Box::new(camera), config)
}

#[cfg(not(feature = "camera"))]
fn open_source(
    _cli: &Cli,
    config: CaptureConfig,
) -> Result<FrameSource, assay_capture::capture::CameraError> {
    let camera = MockCamera::with_scene(MockScene::centered_square());
    FrameSource::new(Box::new(camera), config)
}
