//! Single-flight gating for detection invocation.
//!
//! Detection cost can exceed the inter-frame interval. The gate sheds
//! frames arriving while a detection is in flight instead of queuing
//! them; the next delivered frame is the retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Binary busy flag guarding oracle invocation.
///
/// Owned by one pipeline instance, never shared process-wide. The
/// permit is released only when dropped, which the pipeline does after
/// the oracle callback and its state mutation have completed.
#[derive(Debug, Clone)]
pub struct InferenceGate {
    busy: Arc<AtomicBool>,
}

impl InferenceGate {
    /// Creates an open gate.
    pub fn new() -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attempts to acquire the gate.
    ///
    /// Returns `None` while a permit is outstanding; callers drop the
    /// frame in that case.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(GatePermit {
                busy: Arc::clone(&self.busy),
            })
        } else {
            None
        }
    }

    /// Returns true if a detection is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Default for InferenceGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one detection pass.
#[derive(Debug)]
pub struct GatePermit {
    busy: Arc<AtomicBool>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
