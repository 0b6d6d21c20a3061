//! Nether-PCM: real-time PCM streaming to an audio output device
//!
//! Moves interleaved sample frames from a producer (game loop, emulator,
//! decoder, synthesizer) to an output device without blocking the device's
//! real-time thread and without ever handing it half-written data.
//!
//! # Architecture
//!
//! ```text
//! Main Thread                      Fill Thread ("audio-fill")        Device
//!     │                                   │                            │
//! [push / pump]                           │                            │
//!     │                                   │                            │
//!     ├─ Fifo mode ──►[PacketFifo]──read──►[buffer]───write (blocking)──►│
//!     │                                   │  (silence on miss)         │
//!     │                       Callback mode: [StreamCallback]──►[buffer]
//!     │                                                                │
//!     └─ Queue mode ──(free space?)──────────────────enqueue───────────►│
//! ```
//!
//! - **Callback**: the fill thread asks a [`StreamCallback`] for every
//!   buffer; the FIFO is not involved.
//! - **Fifo**: the main thread pushes frames into a [`PacketFifo`]; the fill
//!   thread drains whole device buffers from it, writing silence whenever a
//!   full buffer is not ready.
//! - **Queue**: no thread. The main thread polls the device's free space each
//!   tick and enqueues exactly that much.
//!
//! # Usage
//!
//! ```ignore
//! use nether_pcm::{
//!     AudioSession, NullBackend, ProducerAdapter, SessionConfig, SineTone, StreamMode,
//! };
//!
//! let config = SessionConfig::default();
//! let mut session = AudioSession::setup(&config, StreamMode::Fifo, NullBackend::new())?;
//! let mut tone = ProducerAdapter::new(SineTone::new(440.0, session.sample_rate()));
//!
//! // once per frame
//! session.pump(&mut tone);
//!
//! session.shutdown();
//! ```

use std::sync::{Mutex, MutexGuard};

pub mod backend;
pub mod config;
pub mod error;
pub mod fifo;
pub mod format;
pub mod producer;
pub mod ring;
pub mod session;

pub use backend::{AudioBackend, NullBackend};
#[cfg(feature = "cpal")]
pub use backend::CpalBackend;
pub use config::{SessionConfig, StreamParams};
pub use error::{BackendError, ConfigError, SessionError};
pub use fifo::{FifoOccupancy, PacketFifo};
pub use format::{Sample, SampleFormat, convert_samples};
pub use producer::{PcmBuffer, Producer, ProducerAdapter, SineTone, StreamCallback};
pub use ring::IndexRing;
pub use session::{AudioSession, MetricsSnapshot, ModeKind, StreamMode};

// =============================================================================
// Defaults (used when a configuration value is zero)
// =============================================================================

/// Output sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Interleaved channels per frame
pub const DEFAULT_NUM_CHANNELS: u16 = 1;

/// Frames per device write
pub const DEFAULT_BUFFER_FRAMES: usize = 2048;

/// Frames per FIFO packet
pub const DEFAULT_PACKET_FRAMES: usize = 128;

/// Packets in the FIFO pool
pub const DEFAULT_NUM_PACKETS: usize = 64;

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
///
/// The fill thread must keep running even if another thread died while
/// holding a lock; the protected state is index bookkeeping that stays
/// consistent between statements.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| {
        tracing::warn!("audio mutex poisoned; continuing");
        e.into_inner()
    })
}
