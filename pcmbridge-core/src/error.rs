use thiserror::Error;

/// All errors produced by pcmbridge-core.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid format: sample_rate={sample_rate} channels={channels}")]
    InvalidFormat { sample_rate: u32, channels: u16 },

    #[error("source error: {0}")]
    Source(String),

    #[error("source made no progress after {attempts} consecutive empty fills")]
    NoProgress { attempts: usize },

    #[error("invalid wav: {0}")]
    InvalidWav(String),

    #[error("unsupported wav encoding: {bits_per_sample}-bit {sample_format}")]
    UnsupportedWav {
        bits_per_sample: u16,
        sample_format: String,
    },

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wav decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
