use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{raise_render_priority, AudioBackend, OutputEndpoint};
use crate::audio::buffer::{fill_silence, ShadowBuffer};
use crate::audio::pump::RenderPump;
use crate::audio::MAX_CHANNELS;
use crate::error::AudioError;
use crate::models::StreamParams;

const DEFAULT_RATE: u32 = 48000;

/// Device-less backend rendering into a discarded buffer on a timer thread.
///
/// Each endpoint paces itself at one latency period per buffer, like a
/// real device would, and accepts every format within the engine limits.
pub struct NullBackend {
    max_channels: u16,
    preferred_rate: u32,
    frames_rendered: Arc<AtomicU64>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_limits(MAX_CHANNELS, DEFAULT_RATE)
    }

    pub fn with_limits(max_channels: u16, preferred_rate: u32) -> Self {
        Self {
            max_channels,
            preferred_rate,
            frames_rendered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames delivered by the streams of this backend, excluding silence padding
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn id(&self) -> &'static str {
        "null"
    }

    fn check_available(&self) -> Result<(), AudioError> {
        Ok(())
    }

    fn max_channel_count(&self) -> Result<u16, AudioError> {
        Ok(self.max_channels)
    }

    fn preferred_sample_rate(&self) -> Result<u32, AudioError> {
        Ok(self.preferred_rate)
    }

    fn min_latency(&self, params: &StreamParams) -> Result<u32, AudioError> {
        // One millisecond worth of frames
        Ok((params.rate / 1000).max(1))
    }

    fn check_format(&self, params: &StreamParams) -> Result<(), AudioError> {
        if params.channels > self.max_channels {
            return Err(AudioError::invalid_format(format!(
                "null backend supports at most {} channels, got {}",
                self.max_channels, params.channels
            )));
        }
        Ok(())
    }

    fn open_output(
        &self,
        name: &str,
        params: &StreamParams,
        latency_frames: u32,
        pump: RenderPump,
    ) -> Result<Box<dyn OutputEndpoint>, AudioError> {
        Ok(Box::new(NullEndpoint {
            name: name.to_string(),
            period: params.frames_to_duration(latency_frames as u64),
            pump,
            frames_rendered: Arc::clone(&self.frames_rendered),
            worker: None,
        }))
    }
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

struct NullEndpoint {
    name: String,
    period: Duration,
    pump: RenderPump,
    frames_rendered: Arc<AtomicU64>,
    worker: Option<Worker>,
}

impl NullEndpoint {
    fn render_loop(pump: RenderPump, period: Duration, shutdown: mpsc::Receiver<()>, rendered: Arc<AtomicU64>) {
        raise_render_priority();

        let params = pump.params();
        let frame_bytes = params.frame_bytes();
        let frames = pump.latency_frames() as usize;
        let mut shadow = ShadowBuffer::with_capacity_frames(&params, frames);
        let mut next_tick = Instant::now();

        loop {
            let buffer = shadow.staging(frames * frame_bytes);
            let delivered = pump.render(buffer, period);
            fill_silence(&mut buffer[delivered * frame_bytes..], params.format);
            rendered.fetch_add(delivered as u64, Ordering::Relaxed);

            next_tick += period;
            let wait = next_tick.saturating_duration_since(Instant::now());
            match shutdown.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl OutputEndpoint for NullEndpoint {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (shutdown, receiver) = mpsc::channel();
        let pump = self.pump.clone();
        let period = self.period;
        let rendered = Arc::clone(&self.frames_rendered);

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || Self::render_loop(pump, period, receiver, rendered))
            .map_err(|e| AudioError::Backend(format!("Failed to spawn render thread for '{}': {}", self.name, e)))?;

        debug!("Null endpoint '{}' rendering every {:?}", self.name, self.period);
        self.worker = Some(Worker { shutdown, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // The receiver may already be gone if the thread exited
        let _ = worker.shutdown.send(());
        worker
            .handle
            .join()
            .map_err(|_| AudioError::Backend(format!("Render thread of '{}' panicked", self.name)))
    }
}

impl Drop for NullEndpoint {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("{}", e);
        }
    }
}
