//! Audio playback via cpal backend.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated priority
//! and has a hard deadline. It **must not**:
//! - Wait on the producer
//! - Return without filling the whole device buffer
//!
//! The callback resolves its sampler through a [`SamplerRegistry`] handle,
//! `try_lock`s it, and calls `RealtimeSampler::sample`, which always fills
//! the buffer. A missing handle or a contended lock yields silence.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioPlayback` therefore must be created and dropped on the same
//! thread.

pub mod device;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::{
    engine::RealtimeSampler,
    error::{BridgeError, Result},
    format::{Format, Sample, SILENCE},
    registry::HandleRegistry,
};

/// A sampler as seen by the audio callback.
pub type SharedSampler = Mutex<Box<dyn RealtimeSampler>>;

/// Handle → sampler lookup shared by every open playback stream.
pub type SamplerRegistry = HandleRegistry<SharedSampler>;

/// Fill `out` from the sampler behind `handle`, or with silence.
///
/// Never blocks: a sampler whose lock is held elsewhere is skipped for this
/// period.
pub fn render(registry: &SamplerRegistry, handle: u64, running: &AtomicBool, out: &mut [Sample]) {
    if !running.load(Ordering::Relaxed) {
        out.fill(SILENCE);
        return;
    }

    match registry.get(handle) {
        Some(sampler) => match sampler.try_lock() {
            Some(mut sampler) => {
                sampler.sample(out);
            }
            None => out.fill(SILENCE),
        },
        None => out.fill(SILENCE),
    }
}

/// Handle to an active playback stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on
/// Windows/macOS.
pub struct AudioPlayback {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Set to `false` to make the callback output silence.
    running: Arc<AtomicBool>,
    /// Format the stream was opened with.
    pub format: Format,
    /// Name of the device actually opened.
    pub device_name: String,
}

impl AudioPlayback {
    /// Open an output device by preferred name, otherwise fall back to the
    /// default output device and then the first available device.
    ///
    /// The stream uses the sampler's own rate and channel count; nothing is
    /// resampled.
    ///
    /// # Errors
    /// - `BridgeError::AudioStream` if `handle` is not registered or cpal
    ///   fails to build or start the stream.
    /// - `BridgeError::NoDefaultOutputDevice` when no output device exists.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        registry: Arc<SamplerRegistry>,
        handle: u64,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let format = registry
            .get(handle)
            .map(|sampler| sampler.lock().format())
            .ok_or_else(|| BridgeError::AudioStream(format!("unknown sampler handle {handle}")))?;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.output_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| device::matches_device_name(&name, preferred_name))
                            .unwrap_or(false)
                    });

                    if selected_device.is_none() {
                        warn!(
                            "preferred output device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list output devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_output_device() {
            default
        } else {
            let mut devices = host
                .output_devices()
                .map_err(|e| BridgeError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(BridgeError::NoDefaultOutputDevice)?;
            warn!("no default output device, falling back to first available output");
            fallback
        };

        let device_name = device.name().unwrap_or_default();
        info!(device = device_name.as_str(), "opening output device");

        let supported = device
            .default_output_config()
            .map_err(|e| BridgeError::AudioDevice(e.to_string()))?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            sample_format = ?supported.sample_format(),
            "playback config selected"
        );

        let stream = match supported.sample_format() {
            SampleFormat::I16 => {
                let registry = Arc::clone(&registry);
                let running = Arc::clone(&running);
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _info| {
                        render(&registry, handle, &running, data);
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::F32 => {
                let registry = Arc::clone(&registry);
                let running = Arc::clone(&running);
                let mut scratch: Vec<Sample> = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _info| {
                        scratch.resize(data.len(), SILENCE);
                        render(&registry, handle, &running, &mut scratch);
                        for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                            *out = sample as f32 / 32768.0;
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::U16 => {
                let registry = Arc::clone(&registry);
                let running = Arc::clone(&running);
                let mut scratch: Vec<Sample> = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [u16], _info| {
                        scratch.resize(data.len(), SILENCE);
                        render(&registry, handle, &running, &mut scratch);
                        for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                            *out = (sample as i32 + 32768) as u16;
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(BridgeError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| BridgeError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| BridgeError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            format,
            device_name,
        })
    }

    /// Open the system default output device.
    ///
    /// Must be called from the thread that will also drop this value.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(
        registry: Arc<SamplerRegistry>,
        handle: u64,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        Self::open_with_preference(registry, handle, running, None)
    }

    /// Stop: the callback outputs silence from its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioPlayback {
    pub fn open_with_preference(
        _registry: Arc<SamplerRegistry>,
        _handle: u64,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(BridgeError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(
        registry: Arc<SamplerRegistry>,
        handle: u64,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        Self::open_with_preference(registry, handle, running, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DiagnosticsSnapshot, StreamStatus};
    use tokio::sync::watch;

    /// Writes a ramp so tests can tell real output from silence.
    struct Ramp {
        next: Sample,
        status_tx: watch::Sender<StreamStatus>,
    }

    impl Ramp {
        fn new() -> Self {
            Self {
                next: 1,
                status_tx: watch::channel(StreamStatus::Running).0,
            }
        }
    }

    impl RealtimeSampler for Ramp {
        fn format(&self) -> Format {
            Format::new(8_000, 1).unwrap()
        }

        fn sample(&mut self, buf: &mut [Sample]) -> usize {
            for slot in buf.iter_mut() {
                *slot = self.next;
                self.next += 1;
            }
            buf.len()
        }

        fn buffered(&self) -> usize {
            0
        }

        fn status(&self) -> StreamStatus {
            StreamStatus::Running
        }

        fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
            self.status_tx.subscribe()
        }

        fn diagnostics(&self) -> DiagnosticsSnapshot {
            DiagnosticsSnapshot::default()
        }

        fn stop(&self) {}
    }

    fn registry_with_ramp() -> (SamplerRegistry, u64) {
        let registry = SamplerRegistry::new();
        let sampler: Box<dyn RealtimeSampler> = Box::new(Ramp::new());
        let handle = registry.register(Arc::new(Mutex::new(sampler)));
        (registry, handle)
    }

    #[test]
    fn render_pulls_from_registered_sampler() {
        let (registry, handle) = registry_with_ramp();
        let running = AtomicBool::new(true);
        let mut out = [0i16; 4];
        render(&registry, handle, &running, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn render_is_silent_for_unknown_handle() {
        let (registry, handle) = registry_with_ramp();
        registry.unregister(handle);
        let running = AtomicBool::new(true);
        let mut out = [9i16; 4];
        render(&registry, handle, &running, &mut out);
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn render_is_silent_when_stopped() {
        let (registry, handle) = registry_with_ramp();
        let running = AtomicBool::new(false);
        let mut out = [9i16; 4];
        render(&registry, handle, &running, &mut out);
        assert_eq!(out, [0; 4]);
    }

    #[cfg(not(feature = "audio-cpal"))]
    #[test]
    fn open_without_backend_reports_stream_error() {
        let (registry, handle) = registry_with_ramp();
        let running = Arc::new(AtomicBool::new(true));
        let err = AudioPlayback::open_default(Arc::new(registry), handle, running)
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::AudioStream(msg) if msg.contains("audio-cpal")));
    }

    #[test]
    fn render_skips_contended_sampler() {
        let (registry, handle) = registry_with_ramp();
        let running = AtomicBool::new(true);
        let sampler = registry.get(handle).unwrap();
        let _held = sampler.lock();
        let mut out = [9i16; 4];
        render(&registry, handle, &running, &mut out);
        assert_eq!(out, [0; 4]);
    }
}
