//! Headless backend that discards audio at real-time speed

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::AudioBackend;
use crate::config::StreamParams;
use crate::error::BackendError;

/// Discards everything written to it
///
/// When paced (the default) it behaves like a device with one buffer of
/// queue: a virtual playback clock drains that queue in real time, writes
/// beyond the free space sleep until the clock catches up, and
/// [`free_space_frames`](AudioBackend::free_space_frames) reports what the
/// clock has drained. Unpaced it accepts everything instantly.
#[derive(Debug)]
pub struct NullBackend {
    params: Option<StreamParams>,
    paced: bool,
    /// Start of the current playback run
    started: Option<Instant>,
    /// Frames written since `started`
    frames_written: u64,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            params: None,
            paced: true,
            started: None,
            frames_written: 0,
        }
    }

    pub fn unpaced() -> Self {
        Self {
            paced: false,
            ..Self::new()
        }
    }

    /// Frames written but not yet "played" by the virtual clock
    fn queued_frames(&self, params: &StreamParams) -> u64 {
        let Some(started) = self.started else {
            return 0;
        };
        let played = (started.elapsed().as_secs_f64() * params.sample_rate as f64) as u64;
        self.frames_written.saturating_sub(played)
    }
}

impl AudioBackend for NullBackend {
    fn open(&mut self, requested: &StreamParams) -> Result<StreamParams, BackendError> {
        debug!(
            "Null audio device opened: {}Hz, {} channel(s), {:?}, {} frame buffer",
            requested.sample_rate,
            requested.num_channels,
            requested.sample_format,
            requested.buffer_frames
        );
        self.params = Some(*requested);
        self.started = None;
        self.frames_written = 0;
        Ok(*requested)
    }

    fn write(&mut self, _buffer: &[u8], frames: usize) -> Result<usize, BackendError> {
        let params = self.params.ok_or(BackendError::NotOpen)?;
        if !self.paced {
            return Ok(frames);
        }

        let queued = self.queued_frames(&params);
        if queued == 0 {
            // the virtual device ran dry; restart its clock
            self.started = Some(Instant::now());
            self.frames_written = 0;
        }

        let overflow = (queued + frames as u64).saturating_sub(params.buffer_frames as u64);
        if overflow > 0 {
            thread::sleep(Duration::from_secs_f64(
                overflow as f64 / params.sample_rate.max(1) as f64,
            ));
        }

        self.frames_written += frames as u64;
        Ok(frames)
    }

    fn free_space_frames(&self) -> usize {
        let Some(params) = self.params else {
            return 0;
        };
        if !self.paced {
            return params.buffer_frames;
        }
        params
            .buffer_frames
            .saturating_sub(self.queued_frames(&params) as usize)
    }

    fn close(&mut self) {
        if self.params.take().is_some() {
            debug!("Null audio device closed");
        }
        self.started = None;
    }
}
