//! Audio device session
//!
//! Ties a backend, an optional packet FIFO and an optional fill thread into
//! one owned value. Three ways to feed the device:
//!
//! ```text
//! Callback:  fill thread ──► StreamCallback ──► buffer ──► backend.write
//! Fifo:      push() ──► PacketFifo ──► fill thread ──► backend.write
//!                                        (silence on miss)
//! Queue:     pump() ──► free space? ──► backend.write (main thread, no FIFO)
//! ```
//!
//! Everything is created by [`AudioSession::setup`] and torn down by
//! [`AudioSession::close`] / [`AudioSession::shutdown`] / drop. A new session
//! needs a new backend, so only one session can drive a device at a time.

mod handle;
mod metrics;
mod thread;

pub use metrics::MetricsSnapshot;

use std::mem;
use std::sync::Arc;

use tracing::{debug, error, warn};

use self::handle::FillHandle;
use self::metrics::{MetricsLog, SessionMetrics};
use self::thread::{FillSource, FillThread};
use crate::backend::AudioBackend;
use crate::config::{SessionConfig, StreamParams};
use crate::error::SessionError;
use crate::fifo::PacketFifo;
use crate::format::{Sample, SampleFormat, convert_samples};
use crate::producer::{Producer, ProducerAdapter, StreamCallback};


/// How the device is fed
pub enum StreamMode {
    /// The fill thread calls this for every device buffer; no FIFO
    Callback(Box<dyn StreamCallback>),
    /// The main thread pushes frames into a packet FIFO drained by the fill thread
    Fifo,
    /// No thread: the main thread enqueues directly into the device's free space
    Queue,
}

impl StreamMode {
    pub fn callback(callback: impl StreamCallback + 'static) -> Self {
        StreamMode::Callback(Box::new(callback))
    }

    pub fn kind(&self) -> ModeKind {
        match self {
            StreamMode::Callback(_) => ModeKind::Callback,
            StreamMode::Fifo => ModeKind::Fifo,
            StreamMode::Queue => ModeKind::Queue,
        }
    }
}

/// [`StreamMode`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Callback,
    Fifo,
    Queue,
}

enum Driver {
    /// Callback and FIFO modes: the backend lives on the fill thread
    Thread(FillHandle),
    /// Queue mode: the backend is driven from the owning thread
    Queue(Box<dyn AudioBackend>),
    Closed,
}

/// A running audio output session
pub struct AudioSession {
    /// Parameters negotiated with the device
    params: StreamParams,
    packet_frames: usize,
    num_packets: usize,
    mode: ModeKind,

    /// Present in FIFO mode only
    fifo: Option<Arc<PacketFifo>>,
    driver: Driver,

    metrics: Arc<SessionMetrics>,
    /// Queue mode logs from the owning thread
    log: MetricsLog,

    /// Reused by `pump` and `push_samples`
    staging: Vec<u8>,
}

impl AudioSession {
    /// Open `backend` and start streaming in `mode`.
    ///
    /// Zero values in `config` take their defaults. Fails if the device
    /// cannot be opened or if the buffer size it negotiates is not a whole
    /// number of packets, or in FIFO mode if the pool cannot hold one device
    /// buffer. In those cases the device is closed again before returning.
    pub fn setup(
        config: &SessionConfig,
        mode: StreamMode,
        backend: impl AudioBackend + 'static,
    ) -> Result<Self, SessionError> {
        let resolved = config.resolved();
        let requested = config.stream_params();

        let mut backend: Box<dyn AudioBackend> = Box::new(backend);
        let params = backend.open(&requested)?;

        if params.sample_rate == 0 || params.num_channels == 0 || params.buffer_frames == 0 {
            backend.close();
            return Err(SessionError::Config(format!(
                "device negotiated unusable parameters: {:?}",
                params
            )));
        }

        if params.buffer_frames % resolved.packet_frames != 0 {
            backend.close();
            return Err(SessionError::PacketMismatch {
                buffer_frames: params.buffer_frames,
                packet_frames: resolved.packet_frames,
            });
        }

        let packets_per_buffer = params.buffer_frames / resolved.packet_frames;
        if matches!(mode, StreamMode::Fifo) && packets_per_buffer > resolved.num_packets {
            backend.close();
            return Err(SessionError::PoolTooSmall {
                num_packets: resolved.num_packets,
                packets_per_buffer,
            });
        }

        let kind = mode.kind();
        let metrics = Arc::new(SessionMetrics::default());
        let mut fifo = None;

        let driver = match mode {
            StreamMode::Callback(callback) => Driver::Thread(FillThread::spawn(
                backend,
                FillSource::Callback(callback),
                params,
                metrics.clone(),
            )?),
            StreamMode::Fifo => {
                let packets = Arc::new(PacketFifo::new(
                    resolved.packet_frames * params.bytes_per_frame(),
                    resolved.num_packets,
                ));
                fifo = Some(packets.clone());
                Driver::Thread(FillThread::spawn(
                    backend,
                    FillSource::Fifo(packets),
                    params,
                    metrics.clone(),
                )?)
            }
            StreamMode::Queue => Driver::Queue(backend),
        };

        debug!(
            "Audio session started: {:?} mode, {}Hz, {} channel(s), {:?}, {} frame buffer, \
             {} x {} frame packets",
            kind,
            params.sample_rate,
            params.num_channels,
            params.sample_format,
            params.buffer_frames,
            resolved.num_packets,
            resolved.packet_frames
        );

        Ok(Self {
            params,
            packet_frames: resolved.packet_frames,
            num_packets: resolved.num_packets,
            mode: kind,
            fifo,
            driver,
            metrics,
            log: MetricsLog::new(),
            staging: Vec::new(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    pub fn num_channels(&self) -> u16 {
        self.params.num_channels
    }

    /// Frames per device write
    pub fn buffer_frames(&self) -> usize {
        self.params.buffer_frames
    }

    /// Frames per FIFO packet
    pub fn packet_frames(&self) -> usize {
        self.packet_frames
    }

    pub fn num_packets(&self) -> usize {
        self.num_packets
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.params.sample_format
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.params.bytes_per_frame()
    }

    /// Parameters negotiated with the device
    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn mode(&self) -> ModeKind {
        self.mode
    }

    /// The packet FIFO, in FIFO mode
    pub fn fifo(&self) -> Option<&PacketFifo> {
        self.fifo.as_deref()
    }

    /// False after [`close`](Self::close), or if the fill thread has died
    pub fn is_valid(&self) -> bool {
        match &self.driver {
            Driver::Thread(handle) => handle.is_alive(),
            Driver::Queue(_) => true,
            Driver::Closed => false,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // =========================================================================
    // Push API
    // =========================================================================

    /// Frames that can be pushed right now without being refused.
    ///
    /// Always 0 in callback mode and after close.
    pub fn expect(&self) -> usize {
        match &self.driver {
            Driver::Thread(_) => self
                .fifo
                .as_ref()
                .map_or(0, |fifo| fifo.writable_bytes() / self.params.bytes_per_frame()),
            Driver::Queue(backend) => backend.free_space_frames(),
            Driver::Closed => 0,
        }
    }

    /// Push interleaved frames already in the session format.
    ///
    /// Trailing bytes that do not make a whole frame are ignored. Returns the
    /// number of frames accepted; the caller keeps the rest for later.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let bytes_per_frame = self.params.bytes_per_frame();
        let frames = bytes.len() / bytes_per_frame;
        if frames == 0 {
            return 0;
        }

        let accepted = match &mut self.driver {
            Driver::Thread(_) => match &self.fifo {
                // the FIFO only ever holds whole frames, so it accepts whole frames
                Some(fifo) => fifo.write(&bytes[..frames * bytes_per_frame]) / bytes_per_frame,
                None => 0,
            },
            Driver::Queue(backend) => {
                let frames = frames.min(backend.free_space_frames());
                if frames == 0 {
                    0
                } else {
                    match backend.write(&bytes[..frames * bytes_per_frame], frames) {
                        Ok(written) => {
                            self.metrics.record_write(written);
                            written
                        }
                        Err(e) => {
                            self.metrics.record_device_error();
                            warn!("Audio device enqueue failed: {}; recovering", e);
                            if let Err(e) = backend.recover() {
                                self.metrics.record_recovery_failure();
                                error!("Audio device recovery failed: {}", e);
                            }
                            0
                        }
                    }
                }
            }
            Driver::Closed => 0,
        };

        self.metrics.record_push(accepted);
        accepted
    }

    /// Push typed interleaved samples, converting them to the session format
    /// when it differs. Returns the number of frames accepted.
    pub fn push_samples<S: Sample>(&mut self, samples: &[S]) -> usize {
        let num_channels = self.params.num_channels as usize;
        let samples = &samples[..samples.len() / num_channels * num_channels];

        if S::FORMAT == self.params.sample_format {
            return self.push(bytemuck::cast_slice(samples));
        }

        let mut staging = mem::take(&mut self.staging);
        staging.resize(samples.len() * self.params.sample_format.bytes_per_sample(), 0);
        convert_samples(samples, self.params.sample_format, 1.0, &mut staging);
        let pushed = self.push(&staging);
        self.staging = staging;
        pushed
    }

    /// Ask `producer` for exactly [`expect`](Self::expect) frames and push
    /// them. Call once per main-loop tick in FIFO or queue mode.
    ///
    /// Returns the number of frames pushed, including any the producer came
    /// up short on (those go out as silence). Skips the tick when there is no
    /// room.
    pub fn pump<P: Producer>(&mut self, producer: &mut ProducerAdapter<P>) -> usize {
        let frames = self.expect();
        if frames == 0 {
            if self.mode != ModeKind::Callback && self.is_valid() {
                self.metrics.record_skip();
            }
            return 0;
        }

        let mut staging = mem::take(&mut self.staging);
        staging.resize(frames * self.params.bytes_per_frame(), 0);
        producer.render(&mut staging, &self.params);
        let pushed = self.push(&staging);
        self.staging = staging;

        if matches!(self.driver, Driver::Queue(_)) {
            self.log.maybe_log(&self.metrics);
        }

        pushed
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stop streaming and release the device.
    ///
    /// Invalidates the FIFO, stops and joins the fill thread, then closes the
    /// backend on this thread. Idempotent; afterwards every push returns 0.
    pub fn close(&mut self) {
        if let Some(fifo) = &self.fifo {
            fifo.shutdown();
        }

        match mem::replace(&mut self.driver, Driver::Closed) {
            Driver::Thread(mut handle) => {
                if let Some(mut backend) = handle.stop_and_join() {
                    backend.close();
                }
            }
            Driver::Queue(mut backend) => backend.close(),
            Driver::Closed => return,
        }

        debug!("Audio session shut down");
    }

    /// [`close`](Self::close) and drop the session
    pub fn shutdown(mut self) {
        self.close();
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.close();
    }
}
