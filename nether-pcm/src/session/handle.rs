//! Fill thread handle
//!
//! Owns the stop flag and the join handle. Dropping the handle stops the
//! thread, joins it, and closes the backend it hands back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::warn;

use crate::backend::AudioBackend;

pub(super) struct FillHandle {
    stop: Arc<AtomicBool>,

    /// Joins to the backend, returned so it can be closed on this thread
    handle: Option<JoinHandle<Box<dyn AudioBackend>>>,
}

impl FillHandle {
    pub fn new(stop: Arc<AtomicBool>, handle: JoinHandle<Box<dyn AudioBackend>>) -> Self {
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Check if the fill thread is still running
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Raise the stop flag and wait for the thread, at most one device
    /// buffer plus whatever the last write blocks for.
    ///
    /// Returns the backend unless the thread panicked or was already joined.
    pub fn stop_and_join(&mut self) -> Option<Box<dyn AudioBackend>> {
        self.stop.store(true, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(backend) => Some(backend),
            Err(_) => {
                warn!("Audio fill thread panicked");
                None
            }
        }
    }
}

impl Drop for FillHandle {
    fn drop(&mut self) {
        if let Some(mut backend) = self.stop_and_join() {
            backend.close();
        }
    }
}
