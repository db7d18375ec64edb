use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::audio::BackendKind;
use crate::config::EngineConfig;
use crate::models::SampleFormat;

pub mod source;
pub mod status;
pub use source::{decode_file, DecodedAudio, PcmSource, ToneSource};
pub use status::StatusLine;

/// Callback-driven audio output streams
#[derive(Debug, Parser)]
#[command(name = "astream")]
#[command(about = "Play audio through callback-driven output streams")]
#[command(version)]
pub struct CliApp {
    #[command(flatten)]
    pub output: OutputArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output settings; each one overrides the configuration file
#[derive(Debug, Clone, Default, Args)]
pub struct OutputArgs {
    /// Audio backend (cpal or null)
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// Output device name
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Stream latency in frames
    #[arg(long, global = true)]
    pub latency: Option<u32>,

    /// Output volume (0.0-1.0)
    #[arg(long, global = true)]
    pub volume: Option<f32>,

    /// Sample format (u8, s16le or f32le)
    #[arg(long, global = true)]
    pub format: Option<SampleFormat>,

    /// Sample rate for generated audio
    #[arg(long, global = true)]
    pub rate: Option<u32>,

    /// Channel count for generated audio
    #[arg(long, global = true)]
    pub channels: Option<u16>,
}

impl OutputArgs {
    /// `config` with the flags that were given applied on top
    pub fn apply(&self, config: &EngineConfig) -> EngineConfig {
        let mut merged = config.clone();
        if let Some(backend) = self.backend {
            merged.backend = backend;
        }
        if let Some(device) = &self.device {
            merged.preferred_device = Some(device.clone());
        }
        if let Some(latency) = self.latency {
            merged.default_latency_frames = latency;
        }
        if let Some(volume) = self.volume {
            merged.default_volume = volume;
        }
        if let Some(format) = self.format {
            merged.format = format;
        }
        if let Some(rate) = self.rate {
            merged.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            merged.channels = channels;
        }
        merged
    }
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play a sine tone
    Tone {
        /// Frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        freq: f32,
        /// Length in seconds
        #[arg(long, default_value_t = 3.0)]
        seconds: f32,
    },
    /// Decode an audio file into memory and play it
    Play {
        /// Path to the audio file
        path: PathBuf,
    },
    /// List output devices and their capabilities
    Devices,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &std::path::Path) -> PathBuf {
        match path.strip_prefix("~") {
            Ok(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => path.to_path_buf(),
            },
            Err(_) => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests;
