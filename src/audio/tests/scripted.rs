use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audio::{AudioBackend, Context, OutputEndpoint, RenderPump};
use crate::error::{AudioError, CallbackError};
use crate::models::{SampleFormat, StreamParams, StreamState};

/// Backend that hands every opened pump to the test
#[derive(Default)]
pub struct ScriptedBackend {
    pumps: Mutex<Vec<RenderPump>>,
    rejected: Option<SampleFormat>,
    unavailable: bool,
    start_failures: AtomicU32,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend whose device does not accept `format`
    pub fn rejecting(format: SampleFormat) -> Arc<Self> {
        Arc::new(Self {
            rejected: Some(format),
            ..Self::default()
        })
    }

    /// Backend that reports its device as gone
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            unavailable: true,
            ..Self::default()
        })
    }

    /// Make the next `count` endpoint starts fail
    pub fn fail_next_starts(&self, count: u32) {
        self.start_failures.store(count, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.pumps.lock().unwrap().len()
    }

    /// Pump of the most recently opened stream
    pub fn last_pump(&self) -> RenderPump {
        self.pumps.lock().unwrap().last().cloned().expect("no stream opened")
    }
}

impl AudioBackend for Arc<ScriptedBackend> {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn check_available(&self) -> Result<(), AudioError> {
        if self.unavailable {
            return Err(AudioError::DeviceNotFound {
                device: "scripted".to_string(),
            });
        }
        Ok(())
    }

    fn max_channel_count(&self) -> Result<u16, AudioError> {
        Ok(8)
    }

    fn preferred_sample_rate(&self) -> Result<u32, AudioError> {
        Ok(44100)
    }

    fn min_latency(&self, _params: &StreamParams) -> Result<u32, AudioError> {
        Ok(64)
    }

    fn check_format(&self, params: &StreamParams) -> Result<(), AudioError> {
        if self.rejected == Some(params.format) {
            return Err(AudioError::invalid_format(format!("scripted device rejects {}", params.format)));
        }
        Ok(())
    }

    fn open_output(
        &self,
        _name: &str,
        _params: &StreamParams,
        _latency_frames: u32,
        pump: RenderPump,
    ) -> Result<Box<dyn OutputEndpoint>, AudioError> {
        self.pumps.lock().unwrap().push(pump);
        Ok(Box::new(ScriptedEndpoint {
            backend: Arc::clone(self),
        }))
    }
}

struct ScriptedEndpoint {
    backend: Arc<ScriptedBackend>,
}

impl OutputEndpoint for ScriptedEndpoint {
    fn start(&mut self) -> Result<(), AudioError> {
        let failures = &self.backend.start_failures;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(AudioError::Backend("scripted start failure".to_string()));
        }
        self.backend.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.backend.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Context on a scripted backend, plus the backend for inspection
pub fn scripted_context(backend: &Arc<ScriptedBackend>) -> Context {
    Context::with_backend("scripted", Arc::new(Arc::clone(backend))).unwrap()
}

/// State callback that records every notification
pub fn recorder() -> (
    Arc<Mutex<Vec<StreamState>>>,
    impl FnMut(StreamState) -> Result<(), CallbackError> + Send + 'static,
) {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    let callback = move |state: StreamState| -> Result<(), CallbackError> {
        sink.lock().unwrap().push(state);
        Ok(())
    };
    (states, callback)
}

/// Render one device buffer of `frames` frames, returning the delivered count
pub fn render(pump: &RenderPump, frames: usize) -> usize {
    let mut output = vec![0u8; frames * pump.params().frame_bytes()];
    pump.render(&mut output, Duration::from_secs(1))
}

/// Render one buffer and return its bytes as well
pub fn render_bytes(pump: &RenderPump, frames: usize) -> (usize, Vec<u8>) {
    let mut output = vec![0u8; frames * pump.params().frame_bytes()];
    let delivered = pump.render(&mut output, Duration::from_secs(1));
    (delivered, output)
}
