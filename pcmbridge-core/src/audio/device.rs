//! Audio output device enumeration.

use serde::{Deserialize, Serialize};

/// Metadata about an audio output device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default output device.
    pub is_default: bool,
    /// Channel count of the device's default output config, if known.
    pub default_channels: Option<u16>,
    /// Sample rate of the device's default output config, if known.
    pub default_sample_rate: Option<u32>,
}

/// Whether a device name satisfies a user's preference.
///
/// Exact match first; otherwise a case-insensitive comparison of the trimmed
/// names, since names typed into a settings file rarely match OS casing.
pub fn matches_device_name(candidate: &str, preferred: &str) -> bool {
    candidate == preferred || candidate.trim().eq_ignore_ascii_case(preferred.trim())
}

/// List all available audio output devices, default first.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    match host.output_devices() {
        Ok(devices) => {
            let mut list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    let config = device.default_output_config().ok();
                    DeviceInfo {
                        name,
                        is_default,
                        default_channels: config.as_ref().map(|c| c.channels()),
                        default_sample_rate: config.as_ref().map(|c| c.sample_rate().0),
                    }
                })
                .collect::<Vec<_>>();

            list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            default_name
                .map(|name| {
                    vec![DeviceInfo {
                        name,
                        is_default: true,
                        default_channels: None,
                        default_sample_rate: None,
                    }]
                })
                .unwrap_or_default()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::matches_device_name;

    #[test]
    fn exact_name_matches() {
        assert!(matches_device_name("Speakers (Realtek Audio)", "Speakers (Realtek Audio)"));
    }

    #[test]
    fn case_and_whitespace_are_ignored() {
        assert!(matches_device_name("Built-in Output", "  built-in output "));
    }

    #[test]
    fn different_names_do_not_match() {
        assert!(!matches_device_name("HDMI Output", "Built-in Output"));
    }
}
