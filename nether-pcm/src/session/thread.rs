//! Device fill thread
//!
//! Loops until the stop flag is raised, producing one device buffer per
//! iteration and handing it to a blocking backend write. The write is the
//! only blocking point; it paces the loop to the hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{debug, error, warn};

use super::handle::FillHandle;
use super::metrics::{MetricsLog, SessionMetrics};
use crate::backend::AudioBackend;
use crate::config::StreamParams;
use crate::error::SessionError;
use crate::fifo::PacketFifo;
use crate::format::fill_silence;
use crate::producer::StreamCallback;

/// Where the fill thread gets its audio from
pub(super) enum FillSource {
    /// User callback, invoked for every buffer
    Callback(Box<dyn StreamCallback>),
    /// Packets pushed by the main thread
    Fifo(Arc<PacketFifo>),
}

pub(super) struct FillThread {
    backend: Box<dyn AudioBackend>,
    source: FillSource,
    params: StreamParams,

    /// One device buffer, reused every iteration
    buffer: Vec<u8>,

    stop: Arc<AtomicBool>,
    metrics: Arc<SessionMetrics>,
    log: MetricsLog,
}

impl FillThread {
    /// Spawn the fill thread. The backend must already be open.
    ///
    /// On failure the backend is dropped along with the unstarted closure.
    pub fn spawn(
        backend: Box<dyn AudioBackend>,
        source: FillSource,
        params: StreamParams,
        metrics: Arc<SessionMetrics>,
    ) -> Result<FillHandle, SessionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();

        let handle = thread::Builder::new()
            .name("audio-fill".into())
            .spawn(move || {
                let mut fill = Self {
                    backend,
                    source,
                    params,
                    buffer: vec![0; params.buffer_bytes()],
                    stop: stop_clone,
                    metrics,
                    log: MetricsLog::new(),
                };
                fill.run();
                fill.backend
            })
            .map_err(SessionError::Spawn)?;

        Ok(FillHandle::new(stop, handle))
    }

    fn run(&mut self) {
        debug!(
            "Audio fill thread started ({} frames per buffer)",
            self.params.buffer_frames
        );

        while !self.stop.load(Ordering::Acquire) {
            self.fill_buffer();

            match self.backend.write(&self.buffer, self.params.buffer_frames) {
                Ok(frames) => self.metrics.record_write(frames),
                Err(e) => self.handle_write_error(e),
            }

            self.log.maybe_log(&self.metrics);
        }

        debug!("Audio fill thread finished");
    }

    fn fill_buffer(&mut self) {
        match &mut self.source {
            FillSource::Callback(callback) => {
                fill_silence(&mut self.buffer);
                callback.fill(&mut self.buffer, &self.params);
            }
            FillSource::Fifo(fifo) => {
                if fifo.read(&mut self.buffer) == 0 {
                    // miss: play silence
                    fill_silence(&mut self.buffer);
                    self.metrics.record_silence();
                }
            }
        }
    }

    fn handle_write_error(&mut self, err: crate::error::BackendError) {
        self.metrics.record_device_error();
        warn!("Audio device write failed: {}; recovering", err);

        if let Err(e) = self.backend.recover() {
            self.metrics.record_recovery_failure();
            error!("Audio device recovery failed: {}", e);
            // don't spin against a dead device
            thread::sleep(self.params.buffer_duration());
        }
    }
}
