use log::{debug, warn};
use std::f32::consts::TAU;
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::OutputBuffer;
use crate::error::{AppError, CallbackError};

/// Sine generator that stops after a fixed number of frames
pub struct ToneSource {
    phase: f32,
    step: f32,
    amplitude: f32,
    remaining: u64,
}

impl ToneSource {
    pub fn new(frequency: f32, seconds: f32, rate: u32, amplitude: f32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / rate as f32,
            amplitude: amplitude.clamp(0.0, 1.0),
            remaining: (seconds.max(0.0) * rate as f32) as u64,
        }
    }

    pub fn remaining_frames(&self) -> u64 {
        self.remaining
    }

    /// Data callback body: writes up to the buffer size, then runs short at the end
    pub fn fill(&mut self, buffer: &mut OutputBuffer<'_>) -> Result<usize, CallbackError> {
        let frames = (buffer.frames() as u64).min(self.remaining) as usize;
        for frame in 0..frames {
            let value = self.phase.sin() * self.amplitude;
            for channel in 0..buffer.channels() {
                buffer.write_normalized(frame, channel, value);
            }
            self.phase = (self.phase + self.step) % TAU;
        }
        self.remaining -= frames as u64;
        Ok(frames)
    }
}

/// Decoded audio held in memory as interleaved normalized samples
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn total_frames(&self) -> u64 {
        if self.channels == 0 {
            return 0;
        }
        (self.samples.len() / self.channels as usize) as u64
    }
}

/// Plays a [`DecodedAudio`] once; the final buffer runs short so the stream drains
pub struct PcmSource {
    audio: DecodedAudio,
    cursor: usize,
}

impl PcmSource {
    pub fn new(audio: DecodedAudio) -> Self {
        Self { audio, cursor: 0 }
    }

    pub fn fill(&mut self, buffer: &mut OutputBuffer<'_>) -> Result<usize, CallbackError> {
        if buffer.channels() != self.audio.channels {
            return Err(CallbackError::new(format!(
                "stream has {} channels, audio has {}",
                buffer.channels(),
                self.audio.channels
            )));
        }

        let channels = self.audio.channels as usize;
        let available = self.audio.samples.len().saturating_sub(self.cursor) / channels;
        let frames = buffer.frames().min(available);

        for frame in 0..frames {
            for channel in 0..channels {
                buffer.write_normalized(frame, channel as u16, self.audio.samples[self.cursor + channel]);
            }
            self.cursor += channels;
        }
        Ok(frames)
    }
}

/// Decode a whole audio file into memory
pub fn decode_file(path: &Path) -> Result<DecodedAudio, AppError> {
    let file = File::open(path)?;
    let media_source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AppError::Decode(format!("unsupported format: {}", e)))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AppError::Decode("no audio track found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AppError::Decode(format!("failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let mut skipped = 0usize;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AppError::Decode(format!("failed to read packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                skipped += 1;
                debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(AppError::Decode(format!("failed to decode packet: {}", e))),
        }
    }

    if skipped > 0 {
        warn!("Skipped {} undecodable packets in {}", skipped, path.display());
    }

    match (rate, channels) {
        (Some(rate), Some(channels)) if channels > 0 => Ok(DecodedAudio { samples, rate, channels }),
        _ => Err(AppError::Decode("file does not declare a sample rate and channel layout".to_string())),
    }
}
