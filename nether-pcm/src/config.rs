//! Session configuration
//!
//! A zero in any numeric field means "use the default", so a partially
//! filled TOML table (or `SessionConfig::default()`) is always usable.
//!
//! ```toml
//! sample_rate = 48000
//! num_channels = 2
//! sample_format = "i16"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::SampleFormat;
use crate::{
    DEFAULT_BUFFER_FRAMES, DEFAULT_NUM_CHANNELS, DEFAULT_NUM_PACKETS, DEFAULT_PACKET_FRAMES,
    DEFAULT_SAMPLE_RATE,
};

/// User-facing audio session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Output sample rate in Hz (0: 44100)
    pub sample_rate: u32,
    /// Interleaved channels per frame (0: 1)
    pub num_channels: u16,
    /// Frames per device write (0: 2048)
    pub buffer_frames: usize,
    /// Frames per FIFO packet (0: 128)
    pub packet_frames: usize,
    /// Packets in the FIFO pool (0: 64)
    pub num_packets: usize,
    pub sample_format: SampleFormat,
}

/// Parameters requested from, and negotiated with, a device backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub num_channels: u16,
    pub sample_format: SampleFormat,
    /// Frames per device write
    pub buffer_frames: usize,
}

impl StreamParams {
    /// Bytes in one interleaved frame
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.num_channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Bytes in one device buffer
    #[inline]
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_frames * self.bytes_per_frame()
    }

    /// Wall-clock length of one device buffer
    pub fn buffer_duration(&self) -> Duration {
        let rate = self.sample_rate.max(1) as f64;
        Duration::from_secs_f64(self.buffer_frames as f64 / rate)
    }
}

fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

impl SessionConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Replace zero values with the defaults
    pub fn resolved(&self) -> Self {
        Self {
            sample_rate: or_default(self.sample_rate, DEFAULT_SAMPLE_RATE),
            num_channels: or_default(self.num_channels, DEFAULT_NUM_CHANNELS),
            buffer_frames: or_default(self.buffer_frames, DEFAULT_BUFFER_FRAMES),
            packet_frames: or_default(self.packet_frames, DEFAULT_PACKET_FRAMES),
            num_packets: or_default(self.num_packets, DEFAULT_NUM_PACKETS),
            sample_format: self.sample_format,
        }
    }

    /// Device parameters to request for this configuration
    pub fn stream_params(&self) -> StreamParams {
        let resolved = self.resolved();
        StreamParams {
            sample_rate: resolved.sample_rate,
            num_channels: resolved.num_channels,
            sample_format: resolved.sample_format,
            buffer_frames: resolved.buffer_frames,
        }
    }
}
