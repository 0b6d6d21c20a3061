//! Session health counters and the periodic metrics log

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::debug;

/// Counters shared between the main thread and the fill thread
#[derive(Debug, Default)]
pub(crate) struct SessionMetrics {
    buffers_written: AtomicU64,
    frames_written: AtomicU64,
    silence_buffers: AtomicU64,
    device_errors: AtomicU64,
    recovery_failures: AtomicU64,
    frames_pushed: AtomicU64,
    pushes_skipped: AtomicU64,
}

/// Point-in-time copy of the session counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Buffers handed to the device by the fill thread or `pump`
    pub buffers_written: u64,
    /// Frames the device accepted
    pub frames_written: u64,
    /// Fill-thread buffers replaced with silence because the FIFO could not
    /// supply a full buffer
    pub silence_buffers: u64,
    /// Failed device writes
    pub device_errors: u64,
    /// Failed recovery attempts after a device error
    pub recovery_failures: u64,
    /// Frames accepted by `push`
    pub frames_pushed: u64,
    /// Queue-mode pumps skipped because the device had no free space
    pub pushes_skipped: u64,
}

impl SessionMetrics {
    pub fn record_write(&self, frames: usize) {
        self.buffers_written.fetch_add(1, Ordering::Relaxed);
        self.frames_written.fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub fn record_silence(&self) {
        self.silence_buffers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_error(&self) {
        self.device_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery_failure(&self) {
        self.recovery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push(&self, frames: usize) {
        self.frames_pushed.fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.pushes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            buffers_written: self.buffers_written.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            silence_buffers: self.silence_buffers.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            recovery_failures: self.recovery_failures.load(Ordering::Relaxed),
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            pushes_skipped: self.pushes_skipped.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Counter growth since `earlier`
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            buffers_written: self.buffers_written.saturating_sub(earlier.buffers_written),
            frames_written: self.frames_written.saturating_sub(earlier.frames_written),
            silence_buffers: self.silence_buffers.saturating_sub(earlier.silence_buffers),
            device_errors: self.device_errors.saturating_sub(earlier.device_errors),
            recovery_failures: self
                .recovery_failures
                .saturating_sub(earlier.recovery_failures),
            frames_pushed: self.frames_pushed.saturating_sub(earlier.frames_pushed),
            pushes_skipped: self.pushes_skipped.saturating_sub(earlier.pushes_skipped),
        }
    }
}

/// Once-per-second summary of counter growth
#[derive(Debug)]
pub(super) struct MetricsLog {
    last: MetricsSnapshot,
    last_log_time: Instant,
}

impl MetricsLog {
    pub fn new() -> Self {
        Self {
            last: MetricsSnapshot::default(),
            last_log_time: Instant::now(),
        }
    }

    /// Log metrics if enough time has passed (every 1 second)
    pub fn maybe_log(&mut self, metrics: &SessionMetrics) {
        if self.last_log_time.elapsed().as_secs() < 1 {
            return;
        }

        let now = metrics.snapshot();
        let delta = now.since(&self.last);
        debug!(
            "AUDIO METRICS [tid={:?}]: buffers={}, frames={}, silence={}, pushed={}, \
             skipped={}, device_errors={}, recovery_failures={}",
            std::thread::current().id(),
            delta.buffers_written,
            delta.frames_written,
            delta.silence_buffers,
            delta.frames_pushed,
            delta.pushes_skipped,
            delta.device_errors,
            delta.recovery_failures
        );

        self.last = now;
        self.last_log_time = Instant::now();
    }
}
