use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

use crate::sample::{Sample, SampleWindow};

/// Outcome of pushing a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Capture is off; the sample was discarded
    Dropped,
    /// Appended to the active window
    Appended,
    /// Appended, and it is the first sample of the capture session
    FirstOfSession,
}

/// Snapshot of buffer counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    /// Samples in the active window
    pub pending: usize,
    /// Samples accepted since creation
    pub total_samples: u64,
    /// Samples discarded because capture was off
    pub dropped_samples: u64,
    /// Windows handed out via `take_window`
    pub windows_taken: u64,
}

/// Accumulates samples while a capture session is active.
///
/// The active window is swapped out whole by `take_window`, so the caller
/// evaluates an owned value while new samples start a fresh window.
pub struct SampleBuffer {
    capturing: AtomicBool,
    session_id: Mutex<Option<Uuid>>,
    window: Mutex<SampleWindow>,

    // Statistics
    session_samples: AtomicUsize,
    total_samples: AtomicU64,
    dropped_samples: AtomicU64,
    windows_taken: AtomicU64,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            capturing: AtomicBool::new(false),
            session_id: Mutex::new(None),
            window: Mutex::new(SampleWindow::new()),
            session_samples: AtomicUsize::new(0),
            total_samples: AtomicU64::new(0),
            dropped_samples: AtomicU64::new(0),
            windows_taken: AtomicU64::new(0),
        }
    }

    /// Begin appending incoming samples. Returns the capture session id;
    /// calling it while already capturing keeps the current session.
    pub fn start_capture(&self) -> Uuid {
        let mut session = self.session_id.lock();
        if let Some(id) = *session {
            if self.capturing.load(Ordering::Acquire) {
                return id;
            }
        }

        let id = Uuid::new_v4();
        *session = Some(id);
        self.session_samples.store(0, Ordering::Relaxed);
        self.capturing.store(true, Ordering::Release);
        info!("Capture session {} started", id);
        id
    }

    /// Stop appending. Samples already in the window stay until the next take.
    pub fn stop_capture(&self) {
        if self.capturing.swap(false, Ordering::AcqRel) {
            if let Some(id) = *self.session_id.lock() {
                info!(
                    "Capture session {} stopped after {} samples",
                    id,
                    self.session_samples.load(Ordering::Relaxed)
                );
            }
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        *self.session_id.lock()
    }

    /// Append a sample to the active window if capture is on
    pub fn push_sample(&self, sample: Sample) -> PushOutcome {
        if !self.is_capturing() {
            self.dropped_samples.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::Dropped;
        }

        self.window.lock().push(sample);
        self.total_samples.fetch_add(1, Ordering::Relaxed);

        if self.session_samples.fetch_add(1, Ordering::AcqRel) == 0 {
            PushOutcome::FirstOfSession
        } else {
            PushOutcome::Appended
        }
    }

    /// Swap out the active window, leaving an empty one in its place
    pub fn take_window(&self) -> SampleWindow {
        let window = std::mem::take(&mut *self.window.lock());
        self.windows_taken.fetch_add(1, Ordering::Relaxed);
        debug!("Took window of {} samples", window.len());
        window
    }

    /// Drop whatever is pending
    pub fn clear(&self) {
        *self.window.lock() = SampleWindow::new();
    }

    pub fn pending(&self) -> usize {
        self.window.lock().len()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            pending: self.pending(),
            total_samples: self.total_samples.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            windows_taken: self.windows_taken.load(Ordering::Relaxed),
        }
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}
