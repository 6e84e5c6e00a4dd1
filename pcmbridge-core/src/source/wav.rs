//! WAV file source backed by `hound`.
//!
//! Only 16-bit integer PCM is accepted; the ring stores i16 and this crate
//! does not convert sample formats.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use super::{Fill, SampleSource};
use crate::error::{BridgeError, Result};
use crate::format::{Format, Sample};

pub struct WavSource<R: Read> {
    reader: WavReader<R>,
    format: Format,
}

impl WavSource<BufReader<File>> {
    /// Open a WAV file from disk.
    ///
    /// # Errors
    /// `BridgeError::Wav` if the header cannot be parsed,
    /// `BridgeError::UnsupportedWav` for anything but 16-bit integer PCM.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening wav source");
        Self::from_wav_reader(WavReader::open(path)?)
    }
}

impl<R: Read + Send + 'static> WavSource<R> {
    /// Parse the WAV header from `reader`.
    pub fn new(reader: R) -> Result<Self> {
        Self::from_wav_reader(WavReader::new(reader)?)
    }
}

impl<R: Read> WavSource<R> {
    fn from_wav_reader(reader: WavReader<R>) -> Result<Self> {
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(BridgeError::UnsupportedWav {
                bits_per_sample: spec.bits_per_sample,
                sample_format: format!("{:?}", spec.sample_format).to_lowercase(),
            });
        }

        let format = Format::new(spec.sample_rate, spec.channels)
            .map_err(|e| BridgeError::InvalidWav(e.to_string()))?;

        debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            samples = reader.len(),
            "wav header parsed"
        );

        Ok(Self { reader, format })
    }

    /// Total number of interleaved samples declared by the header.
    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.len() == 0
    }
}

impl<R: Read + Send + 'static> SampleSource for WavSource<R> {
    fn format(&self) -> Format {
        self.format
    }

    fn fill(&mut self, buf: &mut [Sample]) -> Result<Fill> {
        let mut produced = 0;
        for (dst, sample) in buf.iter_mut().zip(self.reader.samples::<i16>()) {
            *dst = sample?;
            produced += 1;
        }

        if produced == 0 && !buf.is_empty() {
            return Ok(Fill::Exhausted);
        }
        Ok(Fill::Produced(produced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::io::Cursor;

    fn wav_bytes(spec: WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn pcm16(channels: u16, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn reads_header_and_samples() {
        let data = [1i16, -1, 2, -2, 3, -3];
        let bytes = wav_bytes(pcm16(2, 22_050), &data);
        let mut src = WavSource::new(Cursor::new(bytes)).unwrap();

        assert_eq!(src.format(), Format::new(22_050, 2).unwrap());
        assert_eq!(src.len(), 6);

        let mut buf = [0i16; 4];
        assert_eq!(src.fill(&mut buf).unwrap(), Fill::Produced(4));
        assert_eq!(buf, [1, -1, 2, -2]);
        assert_eq!(src.fill(&mut buf).unwrap(), Fill::Produced(2));
        assert_eq!(&buf[..2], &[3, -3]);
        assert_eq!(src.fill(&mut buf).unwrap(), Fill::Exhausted);
    }

    #[test]
    fn rejects_non_16_bit() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.5f32).unwrap();
            writer.finalize().unwrap();
        }
        let err = WavSource::new(Cursor::new(cursor.into_inner())).err().unwrap();
        assert!(matches!(
            err,
            BridgeError::UnsupportedWav {
                bits_per_sample: 32,
                ..
            }
        ));
    }

    #[test]
    fn rejects_garbage_header() {
        let err = WavSource::new(Cursor::new(b"not a wav file at all".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Wav(_)));
    }
}
