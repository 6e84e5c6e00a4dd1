//! pcmbridge: play configured PCM sources through output devices until the
//! sources end or Ctrl-C.

mod settings;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use pcmbridge_core::{audio::device::list_output_devices, audio::SamplerRegistry};
use tracing::{error, info, warn};

use settings::{default_settings_path, load_settings, save_settings, AppSettings, SinkSettings};
use sink::{start_sink, SinkHandle, SinkReport};

const USAGE: &str = "Usage: pcmbridge [--settings <file.json>] [--wav <file.wav>] [--device <name>]
                 [--init] [--list-devices]

  --settings <file>  settings file (default: per-user config dir)
  --wav <file>       play one 16-bit WAV file instead of the configured sinks
  --device <name>    output device for --wav
  --init             write default settings to the settings file and exit
  --list-devices     print output devices as JSON and exit";

#[derive(Debug, Default, PartialEq)]
struct Args {
    settings_path: Option<PathBuf>,
    wav: Option<PathBuf>,
    device: Option<String>,
    init: bool,
    list_devices: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --settings".into());
                };
                parsed.settings_path = Some(PathBuf::from(v));
            }
            "--wav" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --wav".into());
                };
                parsed.wav = Some(PathBuf::from(v));
            }
            "--device" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --device".into());
                };
                parsed.device = Some(v);
            }
            "--init" => parsed.init = true,
            "--list-devices" => parsed.list_devices = true,
            "--help" | "-h" => parsed.help = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    if parsed.device.is_some() && parsed.wav.is_none() {
        return Err("--device only applies to --wav".into());
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pcmbridge=info,pcmbridge_core=info".into()),
        )
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    if args.list_devices {
        println!("{}", serde_json::to_string_pretty(&list_output_devices())?);
        return Ok(());
    }

    let settings_path = args.settings_path.unwrap_or_else(default_settings_path);
    if args.init {
        save_settings(&settings_path, &AppSettings::default())?;
        info!(path = ?settings_path, "default settings written");
        return Ok(());
    }

    let settings = match args.wav {
        Some(path) => {
            let mut settings = AppSettings {
                sinks: vec![SinkSettings {
                    output_device: args.device,
                    ..SinkSettings::wav(path)
                }],
            };
            settings.normalize();
            settings
        }
        None => load_settings(&settings_path),
    };
    info!(settings_path = ?settings_path, sinks = settings.sinks.len(), "pcmbridge starting");

    let registry = Arc::new(SamplerRegistry::new());
    let mut sinks: Vec<SinkHandle> = Vec::new();
    for sink_settings in &settings.sinks {
        match start_sink(sink_settings, Arc::clone(&registry)) {
            Ok(sink) => sinks.push(sink),
            Err(e) => error!(sink = %sink_settings.name, "failed to start sink: {e:#}"),
        }
    }
    if sinks.is_empty() {
        anyhow::bail!("no sink could be started");
    }

    let mut watchers = tokio::task::JoinSet::new();
    for sink in &sinks {
        let name = sink.name().to_string();
        let watch = sink.watch();
        watchers.spawn(async move {
            let status = watch.finished().await;
            match status.error() {
                Some(e) => warn!(sink = %name, "source failed: {e}"),
                None => info!(sink = %name, status = status.label(), "source finished"),
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received, stopping"),
        _ = async { while watchers.join_next().await.is_some() {} } => {
            info!("all sources finished");
        }
    }
    watchers.abort_all();

    let reports: Vec<SinkReport> = tokio::task::spawn_blocking(move || {
        sinks.into_iter().map(SinkHandle::stop).collect::<Vec<_>>()
    })
    .await?;
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments_uses_defaults() {
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn wav_with_device() {
        let parsed = args(&["--wav", "a.wav", "--device", "Speakers"]).unwrap();
        assert_eq!(parsed.wav, Some(PathBuf::from("a.wav")));
        assert_eq!(parsed.device.as_deref(), Some("Speakers"));
    }

    #[test]
    fn missing_value_is_an_error() {
        assert_eq!(args(&["--settings"]).unwrap_err(), "missing value for --settings");
    }

    #[test]
    fn device_requires_wav() {
        assert!(args(&["--device", "Speakers"]).is_err());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(args(&["--loud"]).unwrap_err().contains("--loud"));
    }
}
