//! Producers: anything that can be asked for N frames of audio
//!
//! A [`Producer`] renders in whatever sample type is natural for it (an
//! emulator's i16 mixer, a module player's i32 output, a synth's f32). The
//! [`ProducerAdapter`] turns that into session-format bytes, applies gain,
//! and zero-fills whatever the producer could not deliver.

use crate::config::StreamParams;
use crate::format::{Sample, convert_samples, fill_silence};

/// Source of interleaved sample frames
pub trait Producer {
    type Sample: Sample;

    /// Fill up to `out.len() / num_channels` frames of `out` and return the
    /// number of frames produced. Anything past that is zero-filled by the
    /// caller.
    fn produce(&mut self, out: &mut [Self::Sample], num_channels: usize) -> usize;
}

/// User stream callback for callback mode
///
/// Called on the fill thread once per device buffer. Must fill all of
/// `buffer` (interleaved, session format, native-endian) and must not block.
pub trait StreamCallback: Send {
    fn fill(&mut self, buffer: &mut [u8], params: &StreamParams);
}

impl<F> StreamCallback for F
where
    F: FnMut(&mut [u8], &StreamParams) + Send,
{
    fn fill(&mut self, buffer: &mut [u8], params: &StreamParams) {
        self(buffer, params)
    }
}

/// Converts a [`Producer`]'s native samples into the session format
pub struct ProducerAdapter<P: Producer> {
    producer: P,
    /// Pre-allocated render target, grown on demand
    scratch: Vec<P::Sample>,
    gain: f32,
}

impl<P: Producer> ProducerAdapter<P> {
    pub fn new(producer: P) -> Self {
        Self {
            producer,
            scratch: Vec::new(),
            gain: 1.0,
        }
    }

    /// Pre-size the scratch buffer so the first render does not allocate
    pub fn with_capacity(producer: P, frames: usize, num_channels: usize) -> Self {
        Self {
            producer,
            scratch: vec![P::Sample::SILENCE; frames * num_channels],
            gain: 1.0,
        }
    }

    /// Scale every sample by `gain` during conversion
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn producer_mut(&mut self) -> &mut P {
        &mut self.producer
    }

    pub fn into_inner(self) -> P {
        self.producer
    }

    /// Render `out.len() / bytes_per_frame` frames into `out`.
    ///
    /// Returns the number of frames the producer actually delivered; the rest
    /// of `out` is silence.
    pub fn render(&mut self, out: &mut [u8], params: &StreamParams) -> usize {
        let num_channels = params.num_channels as usize;
        let bytes_per_frame = params.bytes_per_frame();
        if bytes_per_frame == 0 {
            return 0;
        }

        let frames = out.len() / bytes_per_frame;
        let samples = frames * num_channels;
        if self.scratch.len() < samples {
            self.scratch.resize(samples, P::Sample::SILENCE);
        }

        let produced = self
            .producer
            .produce(&mut self.scratch[..samples], num_channels)
            .min(frames);

        let converted = convert_samples(
            &self.scratch[..produced * num_channels],
            params.sample_format,
            self.gain,
            out,
        );
        fill_silence(&mut out[converted * params.sample_format.bytes_per_sample()..]);

        produced
    }
}

impl<P> StreamCallback for ProducerAdapter<P>
where
    P: Producer + Send,
    P::Sample: Send,
{
    fn fill(&mut self, buffer: &mut [u8], params: &StreamParams) {
        self.render(buffer, params);
    }
}

// =============================================================================
// Stock producers
// =============================================================================

/// Endless sine wave, identical on every channel
#[derive(Debug, Clone)]
pub struct SineTone {
    frequency: f32,
    sample_rate: u32,
    amplitude: f32,
    phase: f32,
}

impl SineTone {
    pub fn new(frequency: f32, sample_rate: u32) -> Self {
        Self {
            frequency,
            sample_rate,
            amplitude: 0.5,
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
    }
}

impl Producer for SineTone {
    type Sample = f32;

    fn produce(&mut self, out: &mut [f32], num_channels: usize) -> usize {
        if num_channels == 0 {
            return 0;
        }
        let step = self.frequency / self.sample_rate.max(1) as f32;
        let mut frames = 0;
        for frame in out.chunks_exact_mut(num_channels) {
            frame.fill((self.phase * std::f32::consts::TAU).sin() * self.amplitude);
            self.phase = (self.phase + step).fract();
            frames += 1;
        }
        frames
    }
}

/// Plays a fixed interleaved buffer, optionally looping
///
/// Without looping it behaves like a decoder reaching the end of its data:
/// the last request comes back short and every later one returns 0.
#[derive(Debug, Clone)]
pub struct PcmBuffer<S: Sample> {
    data: Vec<S>,
    /// Next sample index
    position: usize,
    looping: bool,
}

impl<S: Sample> PcmBuffer<S> {
    pub fn new(data: Vec<S>) -> Self {
        Self {
            data,
            position: 0,
            looping: false,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// True once a non-looping buffer has been fully played
    pub fn is_finished(&self) -> bool {
        !self.looping && self.position >= self.data.len()
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl<S: Sample> Producer for PcmBuffer<S> {
    type Sample = S;

    fn produce(&mut self, out: &mut [S], num_channels: usize) -> usize {
        if num_channels == 0 {
            return 0;
        }
        // trailing partial frames in `data` are never played
        let playable = self.data.len() / num_channels * num_channels;
        if playable == 0 {
            return 0;
        }

        let wanted = out.len() / num_channels * num_channels;
        let mut written = 0;
        while written < wanted {
            if self.position >= playable {
                if !self.looping {
                    break;
                }
                self.position = 0;
            }
            let count = (wanted - written).min(playable - self.position);
            out[written..written + count]
                .copy_from_slice(&self.data[self.position..self.position + count]);
            written += count;
            self.position += count;
        }

        written / num_channels
    }
}
