//! Sample storage between a producing source and a real-time consumer.
//!
//! Two stores are provided:
//!
//! - [`ring::SampleRing`]: plain circular buffer, wrapped in a mutex + condvar
//!   by `engine::BufferedSampler`.
//! - `ringbuf::HeapRb<i16>` via [`create_sample_ring`]: wait-free SPSC halves
//!   used by `engine::LockFreeSampler`.
//!
//! Both are sized to one second of audio for the stream's [`Format`].

pub mod ring;

use ringbuf::{traits::Split, HeapRb};
use serde::{Deserialize, Serialize};

pub use ringbuf::traits::{Consumer, Observer, Producer};

use crate::format::{Format, Sample, SILENCE};

/// Producer half of the lock-free ring, held by the pump thread.
pub type SampleProducer = ringbuf::HeapProd<Sample>;

/// Consumer half of the lock-free ring, held by the real-time caller.
pub type SampleConsumer = ringbuf::HeapCons<Sample>;

/// Create a matched producer/consumer pair holding one second of `format`.
pub fn create_sample_ring(format: Format) -> (SampleProducer, SampleConsumer) {
    HeapRb::<Sample>::new(format.samples_per_second()).split()
}

/// What to write into the part of a consumer buffer the ring could not fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderrunPolicy {
    /// Zero every missing sample. Audible as a dropout.
    #[default]
    Silence,
    /// Repeat the last real frame, channel by channel, to avoid a click.
    HoldLast,
}

/// Pads short reads according to an [`UnderrunPolicy`].
///
/// Tracks the channel position of every sample handed to the consumer so a
/// held frame stays channel-aligned even when callers read odd lengths.
/// Never allocates after construction.
#[derive(Debug, Clone)]
pub struct UnderrunFiller {
    policy: UnderrunPolicy,
    last_frame: Box<[Sample]>,
    /// Channel index of the next sample handed out.
    channel: usize,
}

impl UnderrunFiller {
    pub fn new(policy: UnderrunPolicy, format: Format) -> Self {
        Self {
            policy,
            last_frame: vec![SILENCE; format.frame_len()].into_boxed_slice(),
            channel: 0,
        }
    }

    pub fn policy(&self) -> UnderrunPolicy {
        self.policy
    }

    /// `buf[..filled]` holds real samples; pad `buf[filled..]`.
    ///
    /// Returns the number of padded samples.
    pub fn complete(&mut self, buf: &mut [Sample], filled: usize) -> usize {
        let channels = self.last_frame.len();

        for &sample in &buf[..filled] {
            self.last_frame[self.channel] = sample;
            self.channel = (self.channel + 1) % channels;
        }

        let missing = &mut buf[filled..];
        match self.policy {
            UnderrunPolicy::Silence => missing.fill(SILENCE),
            UnderrunPolicy::HoldLast => {
                for slot in missing.iter_mut() {
                    *slot = self.last_frame[self.channel];
                    self.channel = (self.channel + 1) % channels;
                }
                return buf.len() - filled;
            }
        }
        self.channel = (self.channel + missing.len()) % channels;
        buf.len() - filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo() -> Format {
        Format::new(4, 2).unwrap()
    }

    #[test]
    fn lock_free_ring_holds_one_second() {
        let (prod, cons) = create_sample_ring(stereo());
        assert_eq!(prod.capacity().get(), 8);
        assert!(cons.is_empty());
    }

    #[test]
    fn silence_pads_tail_with_zeros() {
        let mut filler = UnderrunFiller::new(UnderrunPolicy::Silence, stereo());
        let mut buf = [5i16, 6, 9, 9, 9];
        assert_eq!(filler.complete(&mut buf, 2), 3);
        assert_eq!(buf, [5, 6, 0, 0, 0]);
    }

    #[test]
    fn hold_last_repeats_last_frame_per_channel() {
        let mut filler = UnderrunFiller::new(UnderrunPolicy::HoldLast, stereo());
        let mut buf = [1i16, -1, 2, -2, 0, 0, 0];
        assert_eq!(filler.complete(&mut buf, 4), 3);
        assert_eq!(buf, [1, -1, 2, -2, 2, -2, 2]);

        // The next call starts on the right channel.
        let mut next = [0i16; 3];
        filler.complete(&mut next, 0);
        assert_eq!(next, [-2, 2, -2]);
    }

    #[test]
    fn hold_last_before_any_data_is_silence() {
        let mut filler = UnderrunFiller::new(UnderrunPolicy::HoldLast, stereo());
        let mut buf = [3i16; 4];
        filler.complete(&mut buf, 0);
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn odd_reads_keep_channel_alignment() {
        let mut filler = UnderrunFiller::new(UnderrunPolicy::HoldLast, stereo());
        let mut a = [10i16, 20, 11];
        filler.complete(&mut a, 3);
        let mut b = [21i16, 0, 0];
        filler.complete(&mut b, 1);
        assert_eq!(b, [21, 11, 21]);
    }
}
