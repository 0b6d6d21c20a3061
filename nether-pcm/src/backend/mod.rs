//! Output device backends
//!
//! The session drives a backend from two places: the fill thread
//! (callback and FIFO modes) issues blocking buffer-sized writes, and the
//! main thread (queue mode) polls free space and enqueues at most that much.

mod null;
#[cfg(feature = "cpal")]
mod output;

#[cfg(feature = "cpal")]
pub use output::CpalBackend;
pub use null::NullBackend;

use crate::config::StreamParams;
use crate::error::BackendError;

/// A native audio output device
///
/// Implementations must release the device on drop as well as on
/// [`close`](Self::close); a session that fails to start its fill thread
/// drops the backend without closing it.
pub trait AudioBackend: Send {
    /// Open the device, trying for `requested`. Returns the parameters the
    /// device actually accepted.
    fn open(&mut self, requested: &StreamParams) -> Result<StreamParams, BackendError>;

    /// Write `frames` interleaved frames from `buffer` (session format).
    ///
    /// Blocks until the device has room. Does not block when `frames` is at
    /// most [`free_space_frames`](Self::free_space_frames). Returns the
    /// number of frames accepted.
    fn write(&mut self, buffer: &[u8], frames: usize) -> Result<usize, BackendError>;

    /// Bring the device back after a failed write (e.g. an underrun)
    fn recover(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Frames the device can take right now without blocking
    fn free_space_frames(&self) -> usize;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn open(&mut self, requested: &StreamParams) -> Result<StreamParams, BackendError> {
        (**self).open(requested)
    }

    fn write(&mut self, buffer: &[u8], frames: usize) -> Result<usize, BackendError> {
        (**self).write(buffer, frames)
    }

    fn recover(&mut self) -> Result<(), BackendError> {
        (**self).recover()
    }

    fn free_space_frames(&self) -> usize {
        (**self).free_space_frames()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
