//! Error types for device backends, sessions and configuration loading

use std::path::PathBuf;

use thiserror::Error;

use crate::format::SampleFormat;

/// Failure reported by an [`AudioBackend`](crate::AudioBackend)
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),

    /// The device ran dry before the write arrived; recoverable with `recover()`
    #[error("Audio device underrun")]
    Underrun,

    #[error("Audio device write failed: {0}")]
    Write(String),

    #[error("Audio device is not open")]
    NotOpen,

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Failure to bring up an [`AudioSession`](crate::AudioSession)
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to open audio device: {0}")]
    Backend(#[from] BackendError),

    /// The negotiated device buffer cannot be assembled from whole packets
    #[error("Device buffer of {buffer_frames} frames is not a whole number of packets")]
    PacketMismatch {
        buffer_frames: usize,
        packet_frames: usize,
    },

    /// The packet pool cannot hold one device buffer, so no read would ever succeed
    #[error("{num_packets} packets cannot hold a {packets_per_buffer}-packet device buffer")]
    PoolTooSmall {
        num_packets: usize,
        packets_per_buffer: usize,
    },

    #[error("Invalid audio configuration: {0}")]
    Config(String),

    #[error("Failed to spawn audio fill thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Failure to load a [`SessionConfig`](crate::SessionConfig) from TOML
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse audio config: {0}")]
    Parse(#[from] toml::de::Error),
}
