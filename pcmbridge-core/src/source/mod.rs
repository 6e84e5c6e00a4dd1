//! Upstream sample sources.
//!
//! The `SampleSource` trait is what the pump drives: anything that can fill a
//! caller-provided buffer of interleaved samples, however slowly or
//! irregularly. `Oscillator`, `WavSource` and `PcmReaderSource` are the
//! bundled implementations.

pub mod oscillator;
pub mod pcm_reader;
pub mod wav;

pub use oscillator::{FrequencyControl, Oscillator};
pub use pcm_reader::PcmReaderSource;
pub use wav::WavSource;

use crate::error::Result;
use crate::format::{Format, Sample};

/// Outcome of a single [`SampleSource::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// `n` samples were written to the front of the buffer. `n` may be 0.
    Produced(usize),
    /// The source has nothing more to give. Nothing was written.
    Exhausted,
}

/// Contract for upstream PCM producers.
///
/// `fill` may block for as long as it needs; it is only ever called from the
/// pump thread, never from the real-time consumer.
pub trait SampleSource: Send + 'static {
    /// Format of the samples this source writes.
    fn format(&self) -> Format;

    /// Write up to `buf.len()` interleaved samples into `buf`.
    ///
    /// The pump always passes a whole number of frames.
    ///
    /// # Errors
    /// Any error is terminal: the pump latches it and never calls `fill` again.
    fn fill(&mut self, buf: &mut [Sample]) -> Result<Fill>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn format(&self) -> Format {
        (**self).format()
    }

    fn fill(&mut self, buf: &mut [Sample]) -> Result<Fill> {
        (**self).fill(buf)
    }
}
