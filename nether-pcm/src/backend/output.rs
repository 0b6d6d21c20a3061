//! cpal output device
//!
//! cpal pulls audio from its own callback thread, so the "device queue" here
//! is a `ringbuf` byte ring: [`write`](AudioBackend::write) pushes whole
//! frames into it and the cpal callback pops them straight into the device
//! buffer, zero-filling on a shortfall. The callback signals a condvar after
//! every pop so a blocked writer wakes as soon as there is room.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a small keeper thread
//! for as long as the backend is open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, warn};

use super::AudioBackend;
use crate::config::StreamParams;
use crate::error::BackendError;
use crate::format::SampleFormat;

/// Device buffers of headroom in the byte ring
const RING_BUFFERS: usize = 2;

/// Upper bound on a single condvar wait while a write is blocked
const MAX_WAIT: Duration = Duration::from_millis(5);

type Signal = Arc<(Mutex<bool>, Condvar)>;

/// Default output device of the default cpal host
#[derive(Default)]
pub struct CpalBackend {
    stream: Option<OpenStream>,
}

struct OpenStream {
    params: StreamParams,
    producer: HeapProd<u8>,
    /// Notified by the cpal callback after it consumes data
    signal: Signal,
    /// Set by the cpal error callback
    failed: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
    keeper: Option<JoinHandle<()>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<u8>,
    signal: Signal,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, BackendError>
where
    T: cpal::SizedSample + bytemuck::Pod,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let bytes: &mut [u8] = bytemuck::cast_slice_mut(data);
                let popped = consumer.pop_slice(bytes);
                bytes[popped..].fill(0);

                // notify_one() doesn't require holding the lock
                let (_lock, cvar) = &*signal;
                cvar.notify_one();
            },
            move |err| {
                error!("Audio stream error: {}", err);
                failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| BackendError::Stream(e.to_string()))
}

fn open_stream(
    params: StreamParams,
    consumer: HeapCons<u8>,
    signal: Signal,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, BackendError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(BackendError::NoDevice)?;

    let config = cpal::StreamConfig {
        channels: params.num_channels,
        sample_rate: cpal::SampleRate(params.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match params.sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, signal, failed)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, signal, failed)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, consumer, signal, failed)?,
    };

    stream
        .play()
        .map_err(|e| BackendError::Stream(format!("Failed to play audio stream: {}", e)))?;
    Ok(stream)
}

/// Keeper thread body: open the device, report back, then hold the stream
/// until told to stop.
fn run_stream(
    params: StreamParams,
    consumer: HeapCons<u8>,
    signal: Signal,
    failed: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<(), BackendError>>,
    stop_rx: mpsc::Receiver<()>,
) {
    match open_stream(params, consumer, signal, failed) {
        Ok(stream) => {
            if ready_tx.send(Ok(())).is_err() {
                return;
            }
            // Blocks until close() sends or drops the sender
            let _ = stop_rx.recv();
            drop(stream);
            debug!("cpal stream released");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

impl AudioBackend for CpalBackend {
    fn open(&mut self, requested: &StreamParams) -> Result<StreamParams, BackendError> {
        self.close();

        let params = *requested;
        let ring = HeapRb::<u8>::new(params.buffer_bytes() * RING_BUFFERS);
        let (producer, consumer) = ring.split();

        let signal: Signal = Arc::new((Mutex::new(false), Condvar::new()));
        let failed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        let keeper = {
            let signal = signal.clone();
            let failed = failed.clone();
            thread::Builder::new()
                .name("audio-cpal".into())
                .spawn(move || run_stream(params, consumer, signal, failed, ready_tx, stop_rx))
                .map_err(|e| BackendError::Stream(format!("Failed to spawn stream thread: {}", e)))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = keeper.join();
                return Err(e);
            }
            Err(_) => {
                let _ = keeper.join();
                return Err(BackendError::Stream("stream thread exited".into()));
            }
        }

        debug!(
            "cpal audio stream started at {}Hz, {} channel(s), {:?}",
            params.sample_rate, params.num_channels, params.sample_format
        );

        self.stream = Some(OpenStream {
            params,
            producer,
            signal,
            failed,
            stop_tx,
            keeper: Some(keeper),
        });
        Ok(params)
    }

    fn write(&mut self, buffer: &[u8], frames: usize) -> Result<usize, BackendError> {
        let stream = self.stream.as_mut().ok_or(BackendError::NotOpen)?;
        let bytes_per_frame = stream.params.bytes_per_frame();
        let frames = frames.min(buffer.len() / bytes_per_frame.max(1));
        let mut remaining = &buffer[..frames * bytes_per_frame];

        while !remaining.is_empty() {
            if stream.failed.swap(false, Ordering::AcqRel) {
                return Err(BackendError::Stream("device reported an error".into()));
            }

            // whole frames only, so the callback never pops half a sample
            let room = stream.producer.vacant_len() / bytes_per_frame * bytes_per_frame;
            if room > 0 {
                let pushed = stream.producer.push_slice(&remaining[..room.min(remaining.len())]);
                remaining = &remaining[pushed..];
                continue;
            }

            let (lock, cvar) = &*stream.signal;
            let guard = lock.lock().unwrap_or_else(|e| {
                warn!("cpal condvar mutex poisoned; continuing");
                e.into_inner()
            });
            let _ = cvar.wait_timeout(guard, MAX_WAIT).unwrap_or_else(|e| {
                warn!("cpal condvar wait mutex poisoned; continuing");
                e.into_inner()
            });
        }

        Ok(frames)
    }

    fn recover(&mut self) -> Result<(), BackendError> {
        let stream = self.stream.as_ref().ok_or(BackendError::NotOpen)?;
        // cpal restarts on its own; dropping the flag is all "prepare" means here
        stream.failed.store(false, Ordering::Release);
        Ok(())
    }

    fn free_space_frames(&self) -> usize {
        self.stream.as_ref().map_or(0, |stream| {
            stream.producer.vacant_len() / stream.params.bytes_per_frame().max(1)
        })
    }

    fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let _ = stream.stop_tx.send(());
        if let Some(keeper) = stream.keeper.take()
            && keeper.join().is_err()
        {
            warn!("cpal stream thread panicked");
        }
        debug!("cpal audio device closed");
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}
