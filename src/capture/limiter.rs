//! Frame-rate gating for camera delivery.
//!
//! Raw camera callback rates can exceed what downstream detection
//! sustains. The limiter drops frames rather than buffering them;
//! the next frame is always a better retry than a stale queue.

use std::time::Duration;

/// Decides deliver/drop so that consecutive delivered frames are
/// separated by at least `1 / target_fps`.
///
/// The decision is a pure function of the last delivered timestamp and
/// the new timestamp; no other state is kept.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_delivered: Option<Duration>,
}

impl RateLimiter {
    /// Creates a limiter targeting the given frame rate.
    ///
    /// A zero rate disables gating entirely (every frame is admitted).
    pub fn new(target_fps: u32) -> Self {
        let min_interval = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(1_000_000_000 / u64::from(target_fps))
        };
        Self {
            min_interval,
            last_delivered: None,
        }
    }

    /// Returns the minimum spacing between delivered frames.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Decides whether a frame with this timestamp is delivered.
    ///
    /// Timestamps are expected to be monotonic; a non-monotonic
    /// timestamp is treated as too early and dropped.
    pub fn admit(&mut self, timestamp: Duration) -> bool {
        match self.last_delivered {
            None => {
                self.last_delivered = Some(timestamp);
                true
            }
            Some(last) => {
                if timestamp >= last && timestamp - last >= self.min_interval {
                    self.last_delivered = Some(timestamp);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Forgets the last delivery, admitting the next frame unconditionally.
    pub fn reset(&mut self) {
        self.last_delivered = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn timestamps(fps: u64, count: u64) -> impl Iterator<Item = Duration> {
        (0..count).map(move |i| Duration::from_nanos(i * 1_000_000_000 / fps))
    }

    #[test]
    fn test_first_frame_always_delivered() {
        let mut limiter = RateLimiter::new(30);
        assert!(limiter.admit(Duration::ZERO));
    }

    #[test]
    fn test_half_rate_downsampling_exact() {
        // 50 fps in (20ms spacing), 25 fps target (40ms): every other frame.
        let mut limiter = RateLimiter::new(25);
        let delivered = timestamps(50, 10).filter(|&t| limiter.admit(t)).count();
        assert_eq!(delivered, 5);
    }

    #[test]
    fn test_sixty_to_thirty_fps_within_boundary() {
        // Nanosecond rounding makes the exact count land on a window
        // boundary; accept one frame of slack on either side.
        let mut limiter = RateLimiter::new(30);
        let delivered = timestamps(60, 10).filter(|&t| limiter.admit(t)).count();
        assert!((4..=6).contains(&delivered), "delivered {delivered}");
    }

    #[test]
    fn test_zero_rate_admits_everything() {
        let mut limiter = RateLimiter::new(0);
        let delivered = timestamps(120, 20).filter(|&t| limiter.admit(t)).count();
        assert_eq!(delivered, 20);
    }

    #[test]
    fn test_reset_admits_next_frame() {
        let mut limiter = RateLimiter::new(30);
        assert!(limiter.admit(Duration::ZERO));
        assert!(!limiter.admit(Duration::from_millis(1)));
        limiter.reset();
        assert!(limiter.admit(Duration::from_millis(2)));
    }

    #[test]
    fn test_non_monotonic_timestamp_dropped() {
        let mut limiter = RateLimiter::new(30);
        assert!(limiter.admit(Duration::from_millis(100)));
        assert!(!limiter.admit(Duration::from_millis(50)));
    }

    proptest! {
        /// Gaps at or above the minimum interval: every frame delivered.
        #[test]
        fn prop_spaced_at_or_above_interval_all_delivered(
            gaps in prop::collection::vec(0u64..50_000_000, 1..50)
        ) {
            let mut limiter = RateLimiter::new(30);
            let min = limiter.min_interval();
            let mut t = Duration::ZERO;
            prop_assert!(limiter.admit(t));
            for extra in gaps {
                t += min + Duration::from_nanos(extra);
                prop_assert!(limiter.admit(t));
            }
        }

        /// Arbitrary spacing: delivered frames never violate the interval.
        #[test]
        fn prop_delivered_frames_respect_interval(
            gaps in prop::collection::vec(0u64..100_000_000, 1..100)
        ) {
            let mut limiter = RateLimiter::new(24);
            let min = limiter.min_interval();
            let mut t = Duration::ZERO;
            let mut last_delivered: Option<Duration> = None;
            for gap in gaps {
                t += Duration::from_nanos(gap);
                if limiter.admit(t) {
                    if let Some(prev) = last_delivered {
                        prop_assert!(t - prev >= min);
                    }
                    last_delivered = Some(t);
                }
            }
        }
    }
}
