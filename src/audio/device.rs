use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SupportedBufferSize, SupportedStreamConfigRange};
use log::debug;

use crate::error::AudioError;
use crate::models::{SampleFormat, StreamParams};

/// Map a cpal sample format onto the formats streams can use
pub fn from_cpal_format(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::U8 => Some(SampleFormat::U8),
        cpal::SampleFormat::I16 => Some(SampleFormat::S16LE),
        cpal::SampleFormat::F32 => Some(SampleFormat::F32LE),
        _ => None,
    }
}

pub fn to_cpal_format(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::U8 => cpal::SampleFormat::U8,
        SampleFormat::S16LE => cpal::SampleFormat::I16,
        SampleFormat::F32LE => cpal::SampleFormat::F32,
    }
}

/// One supported configuration range of a device
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRange {
    pub format: SampleFormat,
    pub channels: u16,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    /// Smallest buffer the device reports for this range, if known
    pub min_buffer_frames: Option<u32>,
}

impl ConfigRange {
    fn from_cpal(range: &SupportedStreamConfigRange) -> Option<Self> {
        let format = from_cpal_format(range.sample_format())?;
        let min_buffer_frames = match range.buffer_size() {
            SupportedBufferSize::Range { min, .. } => Some(*min),
            SupportedBufferSize::Unknown => None,
        };
        Some(Self {
            format,
            channels: range.channels(),
            min_sample_rate: range.min_sample_rate().0,
            max_sample_rate: range.max_sample_rate().0,
            min_buffer_frames,
        })
    }

    pub fn accepts(&self, params: &StreamParams) -> bool {
        self.format == params.format
            && self.channels == params.channels
            && (self.min_sample_rate..=self.max_sample_rate).contains(&params.rate)
    }
}

/// Output capabilities of a device, restricted to the usable sample formats
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub name: String,
    pub is_default: bool,
    pub default_sample_rate: u32,
    pub default_format: Option<SampleFormat>,
    pub ranges: Vec<ConfigRange>,
}

impl DeviceCapabilities {
    pub fn supports(&self, params: &StreamParams) -> bool {
        self.ranges.iter().any(|range| range.accepts(params))
    }

    pub fn max_channels(&self) -> u16 {
        self.ranges.iter().map(|range| range.channels).max().unwrap_or(0)
    }

    pub fn formats(&self) -> Vec<SampleFormat> {
        SampleFormat::ALL
            .iter()
            .copied()
            .filter(|format| self.ranges.iter().any(|range| range.format == *format))
            .collect()
    }

    /// Smallest buffer any range accepting `params` reports
    pub fn min_buffer_frames(&self, params: &StreamParams) -> Option<u32> {
        self.ranges
            .iter()
            .filter(|range| range.accepts(params))
            .filter_map(|range| range.min_buffer_frames)
            .min()
    }

    /// One-line description for device listings
    pub fn summary(&self) -> String {
        let formats: Vec<&str> = self.formats().iter().map(|format| format.as_str()).collect();
        let min_rate = self.ranges.iter().map(|range| range.min_sample_rate).min().unwrap_or(0);
        let max_rate = self.ranges.iter().map(|range| range.max_sample_rate).max().unwrap_or(0);
        format!(
            "{}{}: formats [{}], {}-{} Hz, up to {} channels, default {} Hz",
            self.name,
            if self.is_default { " (default)" } else { "" },
            formats.join(", "),
            min_rate,
            max_rate,
            self.max_channels(),
            self.default_sample_rate
        )
    }
}

/// Device lookup on the default cpal host
pub struct DeviceManager {
    host: Host,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self { host: cpal::default_host() }
    }

    pub fn host_name(&self) -> &'static str {
        self.host.id().name()
    }

    pub fn default_device(&self) -> Result<Device, AudioError> {
        self.host
            .default_output_device()
            .ok_or_else(|| AudioError::InitializationFailed("No default output device available".to_string()))
    }

    pub fn default_device_name(&self) -> Result<String, AudioError> {
        device_name(&self.default_device()?)
    }

    /// Find an output device by exact name
    pub fn find_device(&self, name: &str) -> Result<Device, AudioError> {
        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;

        for device in devices {
            if device.name().map(|n| n == name).unwrap_or(false) {
                return Ok(device);
            }
        }
        Err(AudioError::DeviceNotFound { device: name.to_string() })
    }

    /// The named device, or the default device for `None`
    pub fn resolve(&self, name: Option<&str>) -> Result<Device, AudioError> {
        match name {
            Some(name) => self.find_device(name),
            None => self.default_device(),
        }
    }

    /// Capabilities of every output device; devices that fail to report are skipped
    pub fn list_devices(&self) -> Result<Vec<DeviceCapabilities>, AudioError> {
        let default_name = self.default_device_name().ok();
        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;

        let mut listed = Vec::new();
        for device in devices {
            match capabilities(&device, default_name.as_deref()) {
                Ok(caps) => listed.push(caps),
                Err(e) => debug!("Skipping device: {}", e),
            }
        }
        Ok(listed)
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn device_name(device: &Device) -> Result<String, AudioError> {
    device
        .name()
        .map_err(|e| AudioError::InitializationFailed(format!("Failed to get device name: {}", e)))
}

/// Query a device's supported output configurations
pub fn capabilities(device: &Device, default_name: Option<&str>) -> Result<DeviceCapabilities, AudioError> {
    let name = device_name(device)?;

    let default_config = device
        .default_output_config()
        .map_err(|e| AudioError::Backend(format!("Failed to get default config for {}: {}", name, e)))?;

    let ranges = device
        .supported_output_configs()
        .map_err(|e| AudioError::Backend(format!("Failed to get supported configs for {}: {}", name, e)))?
        .filter_map(|range| ConfigRange::from_cpal(&range))
        .collect();

    Ok(DeviceCapabilities {
        is_default: default_name == Some(name.as_str()),
        name,
        default_sample_rate: default_config.sample_rate().0,
        default_format: from_cpal_format(default_config.sample_format()),
        ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> DeviceCapabilities {
        DeviceCapabilities {
            name: "Test Device".to_string(),
            is_default: true,
            default_sample_rate: 48000,
            default_format: Some(SampleFormat::F32LE),
            ranges: vec![
                ConfigRange {
                    format: SampleFormat::F32LE,
                    channels: 2,
                    min_sample_rate: 44100,
                    max_sample_rate: 96000,
                    min_buffer_frames: Some(64),
                },
                ConfigRange {
                    format: SampleFormat::S16LE,
                    channels: 2,
                    min_sample_rate: 48000,
                    max_sample_rate: 48000,
                    min_buffer_frames: None,
                },
                ConfigRange {
                    format: SampleFormat::F32LE,
                    channels: 6,
                    min_sample_rate: 48000,
                    max_sample_rate: 48000,
                    min_buffer_frames: Some(256),
                },
            ],
        }
    }

    #[test]
    fn test_format_mapping() {
        for format in SampleFormat::ALL {
            assert_eq!(from_cpal_format(to_cpal_format(format)), Some(format));
        }
        assert_eq!(from_cpal_format(cpal::SampleFormat::I32), None);
    }

    #[test]
    fn test_supports_exact_match_only() {
        let caps = caps();
        assert!(caps.supports(&StreamParams::new(SampleFormat::F32LE, 44100, 2)));
        assert!(caps.supports(&StreamParams::new(SampleFormat::S16LE, 48000, 2)));
        assert!(!caps.supports(&StreamParams::new(SampleFormat::S16LE, 44100, 2)));
        assert!(!caps.supports(&StreamParams::new(SampleFormat::F32LE, 48000, 1)));
        assert!(!caps.supports(&StreamParams::new(SampleFormat::U8, 48000, 2)));
    }

    #[test]
    fn test_capability_summary() {
        let caps = caps();
        assert_eq!(caps.max_channels(), 6);
        assert_eq!(caps.formats(), vec![SampleFormat::S16LE, SampleFormat::F32LE]);
        let summary = caps.summary();
        assert!(summary.starts_with("Test Device (default)"));
        assert!(summary.contains("44100-96000 Hz"));
    }

    #[test]
    fn test_min_buffer_frames() {
        let caps = caps();
        assert_eq!(caps.min_buffer_frames(&StreamParams::new(SampleFormat::F32LE, 48000, 2)), Some(64));
        assert_eq!(caps.min_buffer_frames(&StreamParams::new(SampleFormat::S16LE, 48000, 2)), None);
    }
}
