//! PCM stream format shared by a source and whatever consumes it.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// One interleaved signed 16-bit PCM sample.
pub type Sample = i16;

/// Value written for every missing sample on an underrun.
pub const SILENCE: Sample = 0;

/// Sample rate and channel count of an interleaved PCM stream.
///
/// Both values are fixed for the lifetime of any buffer built from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    /// Frames per second (Hz).
    pub sample_rate: u32,
    /// Samples per frame.
    pub channels: u16,
}

impl Format {
    /// # Errors
    /// Returns `BridgeError::InvalidFormat` if either value is zero.
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(BridgeError::InvalidFormat {
                sample_rate,
                channels,
            });
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Number of samples in one frame.
    pub fn frame_len(&self) -> usize {
        self.channels as usize
    }

    /// Number of samples in one second of audio.
    pub fn samples_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize
    }

    /// Round `samples` down to a whole number of frames.
    pub fn whole_frames(&self, samples: usize) -> usize {
        samples - samples % self.frame_len()
    }

    /// Duration of `samples` interleaved samples, in seconds.
    pub fn duration_secs(&self, samples: usize) -> f64 {
        samples as f64 / self.samples_per_second() as f64
    }
}

impl Default for Format {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_fields() {
        assert!(Format::new(0, 2).is_err());
        assert!(Format::new(48_000, 0).is_err());
    }

    #[test]
    fn one_second_of_stereo() {
        let format = Format::new(48_000, 2).unwrap();
        assert_eq!(format.samples_per_second(), 96_000);
        assert_eq!(format.frame_len(), 2);
        assert!((format.duration_secs(48_000) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn whole_frames_rounds_down() {
        let format = Format::new(8_000, 3).unwrap();
        assert_eq!(format.whole_frames(8), 6);
        assert_eq!(format.whole_frames(2), 0);
        assert_eq!(format.whole_frames(9), 9);
    }
}
