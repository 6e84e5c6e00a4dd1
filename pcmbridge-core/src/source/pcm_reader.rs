//! Raw little-endian i16 PCM from any byte reader (pipe, socket, file).

use std::io::{ErrorKind, Read};

use tracing::warn;

use super::{Fill, SampleSource};
use crate::error::Result;
use crate::format::{Format, Sample};

/// Decodes interleaved little-endian i16 samples from a byte stream.
///
/// A read that ends in the middle of a sample keeps the odd byte and
/// completes the sample on the next call. A zero-byte read is end of stream;
/// an odd byte still pending then is dropped with a warning.
pub struct PcmReaderSource<R> {
    reader: R,
    format: Format,
    bytes: Vec<u8>,
    /// Low byte of a sample split across two reads.
    carry: Option<u8>,
}

impl<R: Read + Send + 'static> PcmReaderSource<R> {
    pub fn new(reader: R, format: Format) -> Self {
        Self {
            reader,
            format,
            bytes: Vec::new(),
            carry: None,
        }
    }
}

impl<R: Read + Send + 'static> SampleSource for PcmReaderSource<R> {
    fn format(&self) -> Format {
        self.format
    }

    fn fill(&mut self, buf: &mut [Sample]) -> Result<Fill> {
        if buf.is_empty() {
            return Ok(Fill::Produced(0));
        }

        let prefix = usize::from(self.carry.is_some());
        let want = buf.len() * 2 - prefix;
        self.bytes.resize(buf.len() * 2, 0);
        if let Some(low) = self.carry {
            self.bytes[0] = low;
        }

        let read = loop {
            match self.reader.read(&mut self.bytes[prefix..prefix + want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if read == 0 {
            if self.carry.take().is_some() {
                warn!("pcm stream ended mid-sample, dropping trailing byte");
            }
            return Ok(Fill::Exhausted);
        }

        let available = prefix + read;
        let samples = available / 2;
        for (dst, pair) in buf.iter_mut().zip(self.bytes[..samples * 2].chunks_exact(2)) {
            *dst = i16::from_le_bytes([pair[0], pair[1]]);
        }
        self.carry = (available % 2 == 1).then(|| self.bytes[available - 1]);

        Ok(Fill::Produced(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            let n = out.len().min(self.step).min(self.data.len() - self.pos);
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_little_endian_samples() {
        let bytes = encode(&[1, -2, 300, i16::MIN]);
        let mut src = PcmReaderSource::new(Cursor::new(bytes), Format::default());
        let mut buf = [0i16; 8];
        assert_eq!(src.fill(&mut buf).unwrap(), Fill::Produced(4));
        assert_eq!(&buf[..4], &[1, -2, 300, i16::MIN]);
        assert_eq!(src.fill(&mut buf).unwrap(), Fill::Exhausted);
    }

    #[test]
    fn odd_byte_carries_into_next_fill() {
        let expected = [0x1234i16, -0x0f0f, 77];
        let reader = Trickle {
            data: encode(&expected),
            pos: 0,
            step: 3,
        };
        let mut src = PcmReaderSource::new(reader, Format::default());

        let mut decoded = Vec::new();
        let mut buf = [0i16; 4];
        loop {
            match src.fill(&mut buf).unwrap() {
                Fill::Produced(n) => decoded.extend_from_slice(&buf[..n]),
                Fill::Exhausted => break,
            }
        }
        assert_eq!(decoded, expected);
    }

    #[test]
    fn trailing_odd_byte_is_dropped_at_end_of_stream() {
        let mut bytes = encode(&[5, -6]);
        bytes.push(0x7f);
        let mut src = PcmReaderSource::new(Cursor::new(bytes), Format::default());

        let mut buf = [0i16; 4];
        assert_eq!(src.fill(&mut buf).unwrap(), Fill::Produced(2));
        assert_eq!(&buf[..2], &[5, -6]);
        assert!(src.carry.is_some());

        assert_eq!(src.fill(&mut buf).unwrap(), Fill::Exhausted);
        assert!(src.carry.is_none());
        assert_eq!(src.fill(&mut buf).unwrap(), Fill::Exhausted);
    }
}
