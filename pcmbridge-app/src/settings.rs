//! Persistent application settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use pcmbridge_core::{BufferConfig, UnderrunPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub sinks: Vec<SinkSettings>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            sinks: vec![
                SinkSettings {
                    name: "sweep".into(),
                    sample_rate: 44_100,
                    channels: 2,
                    frequency: 200,
                    volume: 0.03,
                    sweep: Some(SweepSettings::default()),
                    ..SinkSettings::default()
                },
                SinkSettings {
                    name: "tone".into(),
                    sample_rate: 22_050,
                    channels: 1,
                    volume: 0.03,
                    lock_free: true,
                    ..SinkSettings::default()
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Oscillator,
    Wav,
}

/// One playback stream: a source, its buffer, and an output device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SinkSettings {
    pub name: String,
    pub source: SourceKind,
    /// Required when `source` is `wav`; rate and channels come from the file.
    pub wav_path: Option<PathBuf>,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency: u32,
    pub volume: f64,
    /// Bounce the oscillator frequency between two limits.
    pub sweep: Option<SweepSettings>,
    pub output_device: Option<String>,
    /// Use the wait-free ring instead of the mutex + condvar one.
    pub lock_free: bool,
    pub buffer: BufferConfig,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            name: "sink".into(),
            source: SourceKind::Oscillator,
            wav_path: None,
            sample_rate: 44_100,
            channels: 1,
            frequency: 220,
            volume: 0.25,
            sweep: None,
            output_device: None,
            lock_free: false,
            buffer: BufferConfig::default(),
        }
    }
}

impl SinkSettings {
    /// A sink that plays `path` once on the default device.
    pub fn wav(path: PathBuf) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wav".into());
        Self {
            name,
            source: SourceKind::Wav,
            wav_path: Some(path),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SweepSettings {
    pub min_hz: u32,
    pub max_hz: u32,
    pub step_hz: u32,
    pub interval_ms: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            min_hz: 200,
            max_hz: 400,
            step_hz: 1,
            interval_ms: 10,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        for (idx, sink) in self.sinks.iter_mut().enumerate() {
            sink.normalize(idx);
        }
    }
}

impl SinkSettings {
    fn normalize(&mut self, idx: usize) {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            self.name = format!("sink-{}", idx + 1);
        }
        self.sample_rate = self.sample_rate.clamp(8_000, 192_000);
        self.channels = self.channels.clamp(1, 8);
        self.frequency = self.frequency.clamp(1, 20_000);
        self.volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.output_device = self
            .output_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.min_hz = sweep.min_hz.clamp(1, 20_000);
            sweep.max_hz = sweep.max_hz.clamp(sweep.min_hz, 20_000);
            sweep.step_hz = sweep.step_hz.max(1);
            sweep.interval_ms = sweep.interval_ms.clamp(1, 10_000);
        }
        self.buffer.wait_timeout_ms = self.buffer.wait_timeout_ms.clamp(1, 5_000);
        if self.buffer.underrun_policy != UnderrunPolicy::HoldLast {
            self.buffer.underrun_policy = UnderrunPolicy::Silence;
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pcmbridge")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("pcmbridge")
            .join("settings.json")
    }
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = ?path, "invalid settings file, using defaults: {e}");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
