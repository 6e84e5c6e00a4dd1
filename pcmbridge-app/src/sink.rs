//! One configured sink: source → sampler → registry → output device.
//!
//! The cpal stream is `!Send`, so each sink owns a playback thread that opens
//! the device, reports the result back over a channel, and then parks on a
//! stop channel until the sink is torn down. The stream is dropped on that
//! same thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Context};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use pcmbridge_core::{
    audio::{AudioPlayback, SamplerRegistry, SharedSampler},
    source::FrequencyControl,
    BufferedSampler, DiagnosticsSnapshot, Format, LockFreeSampler, Oscillator, RealtimeSampler,
    SampleSource, StreamStatus, WavSource,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::settings::{SinkSettings, SourceKind, SweepSettings};

/// What a stopped sink leaves behind.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkReport {
    pub name: String,
    pub device: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Real (unpadded) audio handed to the device, in seconds.
    pub played_secs: f64,
    pub diagnostics: DiagnosticsSnapshot,
}

/// How often a drained-ring check is repeated after a source ends.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Resolves once a sink has nothing left to play.
pub struct SinkWatch {
    status_rx: watch::Receiver<StreamStatus>,
    sampler: Arc<SharedSampler>,
}

impl SinkWatch {
    /// Wait for the pump to leave `Running`. After `Ended`, also wait until
    /// the device has consumed every buffered sample; `Failed` and
    /// `Cancelled` return at once.
    pub async fn finished(mut self) -> StreamStatus {
        // An error means the sampler was dropped; the last value still holds.
        let _ = self.status_rx.wait_for(|status| !status.is_running()).await;
        let status = self.status_rx.borrow().clone();
        if matches!(status, StreamStatus::Ended) {
            while !self.drained() {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        }
        status
    }

    /// Never waits on the callback: a contended sampler counts as busy.
    fn drained(&self) -> bool {
        self.sampler
            .try_lock()
            .is_some_and(|sampler| sampler.buffered() == 0)
    }
}

pub struct SinkHandle {
    name: String,
    device_name: String,
    format: Format,
    handle: u64,
    registry: Arc<SamplerRegistry>,
    sampler: Arc<SharedSampler>,
    status_rx: watch::Receiver<StreamStatus>,
    stop_tx: Sender<()>,
    playback: Option<JoinHandle<()>>,
    sweep: Option<Sweeper>,
}

impl SinkHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn watch(&self) -> SinkWatch {
        SinkWatch {
            status_rx: self.status_rx.clone(),
            sampler: Arc::clone(&self.sampler),
        }
    }

    /// Close the device, stop the pump, and drop the registry entry.
    pub fn stop(mut self) -> SinkReport {
        let _ = self.stop_tx.send(());
        if let Some(playback) = self.playback.take() {
            if playback.join().is_err() {
                error!(sink = %self.name, "playback thread panicked");
            }
        }
        if let Some(sweep) = self.sweep.take() {
            sweep.stop();
        }

        let diagnostics = {
            let sampler = self.sampler.lock();
            sampler.stop();
            sampler.diagnostics()
        };
        self.registry.unregister(self.handle);

        let status = self.status_rx.borrow().clone();
        info!(
            sink = %self.name,
            status = status.label(),
            samples_read = diagnostics.samples_read,
            samples_padded = diagnostics.samples_padded,
            underruns = diagnostics.underruns,
            backpressure_waits = diagnostics.backpressure_waits,
            "sink stopped"
        );
        SinkReport {
            name: self.name,
            device: self.device_name,
            status: status.label(),
            error: status.error().map(|e| e.to_string()),
            played_secs: self.format.duration_secs(diagnostics.samples_read),
            diagnostics,
        }
    }
}

/// Build the source, start its pump, register it, and open playback.
pub fn start_sink(
    settings: &SinkSettings,
    registry: Arc<SamplerRegistry>,
) -> anyhow::Result<SinkHandle> {
    let (source, frequency) = build_source(settings)?;

    let sampler: Box<dyn RealtimeSampler> = if settings.lock_free {
        Box::new(LockFreeSampler::spawn(source, settings.buffer.clone())?)
    } else {
        Box::new(BufferedSampler::spawn(source, settings.buffer.clone())?)
    };
    let status_rx = sampler.subscribe_status();
    let format = sampler.format();

    let sampler: Arc<SharedSampler> = Arc::new(Mutex::new(sampler));
    let handle = registry.register(Arc::clone(&sampler));
    debug!(sink = %settings.name, handle, "sampler registered");

    let (stop_tx, stop_rx) = bounded::<()>(1);
    let (ready_tx, ready_rx) = bounded(1);
    let playback = {
        let registry = Arc::clone(&registry);
        let preferred = settings.output_device.clone();
        let name = settings.name.clone();
        thread::Builder::new()
            .name(format!("pcmbridge-out-{name}"))
            .spawn(move || run_playback(registry, handle, preferred, ready_tx, stop_rx))
            .context("spawn playback thread")?
    };

    let device_name = match ready_rx.recv() {
        Ok(Ok(device_name)) => device_name,
        Ok(Err(e)) => {
            let _ = playback.join();
            sampler.lock().stop();
            registry.unregister(handle);
            return Err(e).with_context(|| format!("open output for sink '{}'", settings.name));
        }
        Err(_) => {
            sampler.lock().stop();
            registry.unregister(handle);
            bail!("playback thread for sink '{}' exited early", settings.name);
        }
    };

    let sweep = match (frequency, settings.sweep) {
        (Some(control), Some(sweep)) => Some(Sweeper::spawn(control, sweep)?),
        _ => None,
    };

    info!(
        sink = %settings.name,
        device = %device_name,
        sample_rate = format.sample_rate,
        channels = format.channels,
        lock_free = settings.lock_free,
        "sink started"
    );

    Ok(SinkHandle {
        name: settings.name.clone(),
        device_name,
        format,
        handle,
        registry,
        sampler,
        status_rx,
        stop_tx,
        playback: Some(playback),
        sweep,
    })
}

fn build_source(
    settings: &SinkSettings,
) -> anyhow::Result<(Box<dyn SampleSource>, Option<FrequencyControl>)> {
    match settings.source {
        SourceKind::Oscillator => {
            let format = Format::new(settings.sample_rate, settings.channels)?;
            let osc = Oscillator::with_tone(format, settings.frequency, settings.volume);
            let control = osc.frequency_control();
            Ok((Box::new(osc), Some(control)))
        }
        SourceKind::Wav => {
            let Some(path) = settings.wav_path.as_ref() else {
                bail!("sink '{}' has source \"wav\" but no wavPath", settings.name);
            };
            let wav = WavSource::open(path).with_context(|| format!("open {}", path.display()))?;
            if settings.sweep.is_some() {
                warn!(sink = %settings.name, "sweep ignored for wav source");
            }
            Ok((Box::new(wav), None))
        }
    }
}

fn run_playback(
    registry: Arc<SamplerRegistry>,
    handle: u64,
    preferred: Option<String>,
    ready_tx: Sender<anyhow::Result<String>>,
    stop_rx: Receiver<()>,
) {
    let running = Arc::new(AtomicBool::new(true));
    let playback = match AudioPlayback::open_with_preference(
        registry,
        handle,
        Arc::clone(&running),
        preferred.as_deref(),
    ) {
        Ok(playback) => playback,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };
    let _ = ready_tx.send(Ok(playback.device_name.clone()));

    // Either an explicit stop or the handle being dropped ends playback.
    let _ = stop_rx.recv();
    playback.stop();
    drop(playback);
}

/// Bounces an oscillator's frequency between two limits.
struct Sweeper {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Sweeper {
    fn spawn(control: FrequencyControl, sweep: SweepSettings) -> anyhow::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("pcmbridge-sweep".into())
            .spawn(move || {
                let mut rising = true;
                let interval = Duration::from_millis(sweep.interval_ms);
                while flag.load(Ordering::Relaxed) {
                    let (next, still_rising) = sweep_step(control.get(), rising, &sweep);
                    control.set(next);
                    rising = still_rising;
                    thread::sleep(interval);
                }
            })
            .context("spawn sweep thread")?;
        Ok(Self { running, thread })
    }

    fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        if self.thread.join().is_err() {
            error!("sweep thread panicked");
        }
    }
}

/// Next frequency of a ping-pong sweep and the direction after it.
fn sweep_step(current: u32, rising: bool, sweep: &SweepSettings) -> (u32, bool) {
    let current = current.clamp(sweep.min_hz, sweep.max_hz);
    if rising {
        let next = current.saturating_add(sweep.step_hz).min(sweep.max_hz);
        (next, next < sweep.max_hz)
    } else {
        let next = current.saturating_sub(sweep.step_hz).max(sweep.min_hz);
        (next, next <= sweep.min_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcmbridge_core::{BufferConfig, PcmReaderSource};
    use std::io::Cursor;
    use std::path::PathBuf;

    /// A sampler over `samples` mono samples that ends once they are read.
    fn finite_sampler(samples: usize) -> (Arc<SharedSampler>, watch::Receiver<StreamStatus>) {
        let source = PcmReaderSource::new(
            Cursor::new(vec![1u8; samples * 2]),
            Format::new(8_000, 1).unwrap(),
        );
        let sampler = BufferedSampler::spawn(source, BufferConfig::default()).unwrap();
        let status_rx = sampler.subscribe_status();
        let boxed: Box<dyn RealtimeSampler> = Box::new(sampler);
        (Arc::new(Mutex::new(boxed)), status_rx)
    }

    #[tokio::test]
    async fn ended_sink_plays_out_buffered_audio_first() {
        let (sampler, mut status_rx) = finite_sampler(600);
        let watch = SinkWatch {
            status_rx: status_rx.clone(),
            sampler: Arc::clone(&sampler),
        };
        let finished = tokio::spawn(watch.finished());

        let _ = status_rx.wait_for(|s| !s.is_running()).await;
        assert!(matches!(*status_rx.borrow(), StreamStatus::Ended));
        assert_eq!(sampler.lock().buffered(), 600);

        tokio::time::sleep(DRAIN_POLL * 5).await;
        assert!(!finished.is_finished(), "resolved with audio still queued");

        let mut buf = vec![0i16; 600];
        sampler.lock().sample(&mut buf);
        assert!(buf.iter().all(|&s| s == 0x0101));

        let status = tokio::time::timeout(Duration::from_secs(5), finished)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(status, StreamStatus::Ended));
    }

    #[tokio::test]
    async fn cancelled_sink_resolves_without_draining() {
        let osc = Oscillator::new(Format::new(8_000, 1).unwrap());
        let sampler = BufferedSampler::spawn(osc, BufferConfig::default()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while sampler.buffered() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(sampler.buffered() > 0);
        sampler.stop();

        let status_rx = sampler.subscribe_status();
        let boxed: Box<dyn RealtimeSampler> = Box::new(sampler);
        let watch = SinkWatch {
            status_rx,
            sampler: Arc::new(Mutex::new(boxed)),
        };
        let status = tokio::time::timeout(Duration::from_secs(1), watch.finished())
            .await
            .unwrap();
        assert!(matches!(status, StreamStatus::Cancelled));
    }

    fn sweep() -> SweepSettings {
        SweepSettings {
            min_hz: 200,
            max_hz: 203,
            step_hz: 2,
            interval_ms: 1,
        }
    }

    #[test]
    fn sweep_turns_around_at_both_limits() {
        let s = sweep();
        let mut freq = 200;
        let mut rising = true;
        let mut seen = Vec::new();
        for _ in 0..5 {
            let (next, dir) = sweep_step(freq, rising, &s);
            freq = next;
            rising = dir;
            seen.push(freq);
        }
        assert_eq!(seen, vec![202, 203, 201, 200, 202]);
    }

    #[test]
    fn sweep_pulls_out_of_range_frequency_back_in() {
        let (next, rising) = sweep_step(1_000, true, &sweep());
        assert_eq!(next, 203);
        assert!(!rising);
    }

    #[test]
    fn oscillator_source_exposes_frequency_control() {
        let settings = SinkSettings {
            sample_rate: 8_000,
            channels: 2,
            frequency: 300,
            ..SinkSettings::default()
        };
        let (source, control) = build_source(&settings).unwrap();
        assert_eq!(source.format(), Format::new(8_000, 2).unwrap());
        assert_eq!(control.unwrap().get(), 300);
    }

    #[test]
    fn wav_source_without_path_is_rejected() {
        let settings = SinkSettings {
            source: SourceKind::Wav,
            wav_path: None,
            ..SinkSettings::default()
        };
        assert!(build_source(&settings).is_err());
    }

    #[test]
    fn missing_wav_file_is_reported() {
        let settings = SinkSettings::wav(PathBuf::from("/nonexistent/pcmbridge-missing.wav"));
        let err = build_source(&settings).err().unwrap();
        assert!(err.to_string().contains("pcmbridge-missing.wav"));
    }
}
