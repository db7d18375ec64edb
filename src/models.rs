use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sample encodings a stream can be opened with.
///
/// The engine never converts between encodings: the callback writes the
/// encoding the stream was opened with and the backend must accept it as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 8-bit unsigned PCM, silence at 128
    U8,
    /// Little endian 16-bit signed PCM
    S16LE,
    /// Little endian 32-bit IEEE float PCM
    F32LE,
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 3] = [SampleFormat::U8, SampleFormat::S16LE, SampleFormat::F32LE];

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16LE => 2,
            SampleFormat::F32LE => 4,
        }
    }

    /// Byte value that encodes silence
    pub fn silence_byte(&self) -> u8 {
        match self {
            SampleFormat::U8 => 0x80,
            SampleFormat::S16LE | SampleFormat::F32LE => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16LE => "s16le",
            SampleFormat::F32LE => "f32le",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "u8" => Ok(SampleFormat::U8),
            "s16le" | "s16" | "i16" => Ok(SampleFormat::S16LE),
            "f32le" | "f32" | "float" => Ok(SampleFormat::F32LE),
            other => Err(format!("unknown sample format '{}' (expected u8, s16le or f32le)", other)),
        }
    }
}

/// Requested stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u16,
}

impl StreamParams {
    pub fn new(format: SampleFormat, rate: u32, channels: u16) -> Self {
        Self { format, rate, channels }
    }

    /// Size of one frame (one sample per channel) in bytes
    pub fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// Wall-clock duration of `frames` frames at this rate
    pub fn frames_to_duration(&self, frames: u64) -> Duration {
        if self.rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.rate as f64)
    }

    /// Short human readable description, e.g. "s16le 48000 Hz 2ch"
    pub fn describe(&self) -> String {
        format!("{} {} Hz {}ch", self.format, self.rate, self.channels)
    }
}

/// Stream states reported through the state callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Started,
    Stopped,
    Drained,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Started => "STARTED",
            StreamState::Stopped => "STOPPED",
            StreamState::Drained => "DRAINED",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render statistics of a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Number of data callback invocations
    pub callbacks: u64,
    /// Frames handed to the backend (same value as the position)
    pub frames_delivered: u64,
    /// Callbacks that ran longer than their buffer's deadline
    pub overruns: u64,
    /// Set when the stream stopped because of a callback or device error
    pub errored: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_sizes() {
        assert_eq!(SampleFormat::U8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16LE.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::F32LE.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::U8.silence_byte(), 0x80);
        assert_eq!(SampleFormat::F32LE.silence_byte(), 0);
    }

    #[test]
    fn test_sample_format_parsing() {
        assert_eq!("s16le".parse::<SampleFormat>(), Ok(SampleFormat::S16LE));
        assert_eq!("F32LE".parse::<SampleFormat>(), Ok(SampleFormat::F32LE));
        assert_eq!(" u8 ".parse::<SampleFormat>(), Ok(SampleFormat::U8));
        assert!("s24le".parse::<SampleFormat>().is_err());

        for format in SampleFormat::ALL {
            assert_eq!(format.as_str().parse::<SampleFormat>(), Ok(format));
        }
    }

    #[test]
    fn test_stream_params_frame_math() {
        let params = StreamParams::new(SampleFormat::S16LE, 48000, 2);
        assert_eq!(params.frame_bytes(), 4);
        assert_eq!(params.frames_to_duration(48000), Duration::from_secs(1));
        assert_eq!(params.frames_to_duration(24000), Duration::from_millis(500));
        assert_eq!(params.describe(), "s16le 48000 Hz 2ch");

        let zero_rate = StreamParams::new(SampleFormat::U8, 0, 1);
        assert_eq!(zero_rate.frames_to_duration(100), Duration::ZERO);
    }

    #[test]
    fn test_sample_format_serde_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            format: SampleFormat,
        }

        let text = toml::to_string(&Wrapper { format: SampleFormat::F32LE }).unwrap();
        assert!(text.contains("\"f32le\""));
        let parsed: Wrapper = toml::from_str("format = \"s16le\"").unwrap();
        assert_eq!(parsed.format, SampleFormat::S16LE);
    }

    #[test]
    fn test_stream_params_json_shape() {
        let params = StreamParams::new(SampleFormat::S16LE, 48000, 2);
        let value = serde_json::to_value(params).unwrap();
        assert_eq!(value, serde_json::json!({ "format": "s16le", "rate": 48000, "channels": 2 }));

        let back: StreamParams = serde_json::from_value(value).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_stream_state_names() {
        assert_eq!(StreamState::Started.to_string(), "STARTED");
        assert_eq!(StreamState::Stopped.as_str(), "STOPPED");
        assert_eq!(StreamState::Drained.as_str(), "DRAINED");
    }
}
