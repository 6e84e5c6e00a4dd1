//! Sine oscillator source.
//!
//! ## Algorithm
//!
//! Per frame, advance the phase accumulator by `2π · f / sample_rate`, wrap
//! it into `[0, 2π)`, and write `sin(phase) · i16::MAX · volume` (clamped to
//! the i16 range) to every channel of the frame.
//!
//! The frequency lives in a shared atomic so another thread can sweep it
//! while the pump owns the oscillator.

use std::f64::consts::TAU;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use super::{Fill, SampleSource};
use crate::error::Result;
use crate::format::{Format, Sample};

/// Shared handle for changing an [`Oscillator`]'s frequency from elsewhere.
#[derive(Debug, Clone)]
pub struct FrequencyControl(Arc<AtomicU32>);

impl FrequencyControl {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, hz: u32) {
        self.0.store(hz, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct Oscillator {
    format: Format,
    frequency: FrequencyControl,
    /// Linear gain; 1.0 is full scale. Values above 1.0 clip.
    volume: f64,
    phase: f64,
}

impl Oscillator {
    /// Default tone: 220 Hz at 1/4 volume.
    pub fn new(format: Format) -> Self {
        Self::with_tone(format, 220, 0.25)
    }

    pub fn with_tone(format: Format, frequency: u32, volume: f64) -> Self {
        Self {
            format,
            frequency: FrequencyControl(Arc::new(AtomicU32::new(frequency))),
            volume,
            phase: 0.0,
        }
    }

    /// Handle that changes the frequency of subsequently generated frames.
    pub fn frequency_control(&self) -> FrequencyControl {
        self.frequency.clone()
    }

    fn next_value(&mut self) -> Sample {
        let step = TAU * self.frequency.get() as f64 / self.format.sample_rate as f64;
        self.phase = (self.phase + step) % TAU;
        let value = self.phase.sin() * i16::MAX as f64 * self.volume;
        value.clamp(i16::MIN as f64, i16::MAX as f64) as Sample
    }
}

impl SampleSource for Oscillator {
    fn format(&self) -> Format {
        self.format
    }

    fn fill(&mut self, buf: &mut [Sample]) -> Result<Fill> {
        let channels = self.format.frame_len();
        let frames = buf.len() / channels;

        for frame in buf.chunks_exact_mut(channels) {
            let value = self.next_value();
            frame.fill(value);
        }

        Ok(Fill::Produced(frames * channels))
    }
}
