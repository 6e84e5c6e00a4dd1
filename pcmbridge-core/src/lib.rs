//! # pcmbridge-core
//!
//! Decouples a PCM producer that runs at its own pace from a consumer that
//! must never stall.
//!
//! ## Architecture
//!
//! ```text
//! SampleSource ─► pump thread ─► one-second ring ─► sample(&mut buf)
//!   (oscillator,     │   ▲                              │
//!    wav, reader)    │   └── wakes on read ◄────────────┤
//!                    │                                  ▼
//!          blocks while ring full           always buf.len() samples,
//!                                           padded on underrun
//! ```
//!
//! `BufferedSampler` guards the ring with a mutex and condvar;
//! `LockFreeSampler` uses a wait-free SPSC ring and thread parking. Both
//! latch the pump's terminal status (`Ended`, `Failed`, `Cancelled`) where
//! the owner can see it without touching the audio path.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod format;
pub mod registry;
pub mod source;

// Convenience re-exports for downstream crates
pub use buffering::UnderrunPolicy;
pub use engine::{
    BufferConfig, BufferedSampler, DiagnosticsSnapshot, LockFreeSampler, RealtimeSampler,
    StreamStatus,
};
pub use error::BridgeError;
pub use format::{Format, Sample};
pub use registry::HandleRegistry;
pub use source::{Fill, Oscillator, PcmReaderSource, SampleSource, WavSource};
