//! Sample representations and conversion into the transport format
//!
//! Everything past the producer adapter moves opaque native-endian bytes;
//! this module is the only place that knows what a sample looks like.

use serde::{Deserialize, Serialize};

/// Representation of one sample on the wire to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 32-bit float in [-1.0, 1.0]
    #[default]
    F32,
    /// Signed 16-bit PCM
    I16,
    /// Signed 32-bit PCM
    I32,
}

impl SampleFormat {
    /// Width of one sample in bytes
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::F32 | SampleFormat::I32 => 4,
            SampleFormat::I16 => 2,
        }
    }
}

/// A sample type producers can render into
///
/// Zero is silence for every implementation, so a zeroed byte buffer is a
/// silent buffer regardless of format.
pub trait Sample: bytemuck::Pod + Send + 'static {
    /// Transport format with the same in-memory layout
    const FORMAT: SampleFormat;

    const SILENCE: Self;

    /// Normalize to [-1.0, 1.0]
    fn to_f32(self) -> f32;

    /// Quantize from [-1.0, 1.0], clamping out-of-range input
    fn from_f32(value: f32) -> Self;
}

impl Sample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;
    const SILENCE: Self = 0.0;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value.clamp(-1.0, 1.0)
    }
}

impl Sample for i16 {
    const FORMAT: SampleFormat = SampleFormat::I16;
    const SILENCE: Self = 0;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / i16::MAX as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }
}

impl Sample for i32 {
    const FORMAT: SampleFormat = SampleFormat::I32;
    const SILENCE: Self = 0;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / i32::MAX as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        // f64 keeps full scale exact
        (value.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32
    }
}

/// Convert `src` into `format`, applying a linear `gain`, and write the
/// native-endian result to `dst`.
///
/// Converts as many whole samples as both sides allow and returns that
/// count. Every output is clamped to full scale. Same-format integer input
/// at unit gain is copied byte for byte, since it is already in range.
pub fn convert_samples<S: Sample>(
    src: &[S],
    format: SampleFormat,
    gain: f32,
    dst: &mut [u8],
) -> usize {
    let width = format.bytes_per_sample();
    let count = src.len().min(dst.len() / width);
    let src = &src[..count];
    let dst = &mut dst[..count * width];

    if S::FORMAT == format && format != SampleFormat::F32 && gain == 1.0 {
        dst.copy_from_slice(bytemuck::cast_slice(src));
        return count;
    }

    for (sample, out) in src.iter().zip(dst.chunks_exact_mut(width)) {
        let value = sample.to_f32() * gain;
        match format {
            SampleFormat::F32 => out.copy_from_slice(&f32::from_f32(value).to_ne_bytes()),
            SampleFormat::I16 => out.copy_from_slice(&i16::from_f32(value).to_ne_bytes()),
            SampleFormat::I32 => out.copy_from_slice(&i32::from_f32(value).to_ne_bytes()),
        }
    }

    count
}

/// Zero `dst`, which is silence in every supported format
#[inline]
pub fn fill_silence(dst: &mut [u8]) {
    dst.fill(0);
}
