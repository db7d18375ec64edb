use log::{debug, error};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::backend::{AudioBackend, BackendKind};
use crate::audio::pump::RenderPump;
use crate::audio::stream::{Stream, StreamCore};
use crate::audio::{DataCallback, OutputBuffer, StateCallback};
use crate::audio::{MAX_CHANNELS, MAX_LATENCY_FRAMES, MAX_SAMPLE_RATE, MIN_LATENCY_FRAMES};
use crate::config::EngineConfig;
use crate::error::{AudioError, CallbackError};
use crate::logging::EngineLogger;
use crate::models::{StreamParams, StreamState};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Context internals shared with every stream it created
pub(crate) struct ContextInner {
    name: String,
    backend: Arc<dyn AudioBackend>,
    /// Live streams by id; a back-reference for teardown validation only
    streams: Mutex<BTreeMap<u64, String>>,
    logger: EngineLogger,
}

impl ContextInner {
    fn streams(&self) -> MutexGuard<'_, BTreeMap<u64, String>> {
        self.streams.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.streams().remove(&id);
    }
}

/// Application-wide audio context.
///
/// Owns the backend shared by its streams. Every stream must be destroyed
/// before the context: [`Context::destroy`] panics if any are still alive.
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a context on the default (cpal) backend
    pub fn init(name: &str) -> Result<Self, AudioError> {
        let backend = BackendKind::Cpal.create(None)?;
        Self::with_backend(name, backend)
    }

    /// Create a context using the backend and device named in `config`
    pub fn from_config(name: &str, config: &EngineConfig) -> Result<Self, AudioError> {
        let backend = config.backend.create(config.preferred_device.as_deref())?;
        Self::with_backend(name, backend)
    }

    /// Create a context on an explicit backend
    ///
    /// Fails with `AudioError::InitializationFailed` if the backend reports
    /// that it cannot drive a device.
    pub fn with_backend(name: &str, backend: Arc<dyn AudioBackend>) -> Result<Self, AudioError> {
        backend.check_available().map_err(|e| match e {
            e @ AudioError::InitializationFailed(_) => e,
            other => AudioError::InitializationFailed(format!("{} backend unavailable: {}", backend.id(), other)),
        })?;

        let logger = EngineLogger::new();
        logger.log_context_created(name, backend.id());

        Ok(Self {
            inner: Arc::new(ContextInner {
                name: name.to_string(),
                backend,
                streams: Mutex::new(BTreeMap::new()),
                logger,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn backend_id(&self) -> &'static str {
        self.inner.backend.id()
    }

    pub fn max_channel_count(&self) -> Result<u16, AudioError> {
        self.inner.backend.max_channel_count()
    }

    pub fn preferred_sample_rate(&self) -> Result<u32, AudioError> {
        self.inner.backend.preferred_sample_rate()
    }

    pub fn min_latency(&self, params: &StreamParams) -> Result<u32, AudioError> {
        self.inner.backend.min_latency(params)
    }

    /// Event history shared by the context and its streams
    pub fn logger(&self) -> &EngineLogger {
        &self.inner.logger
    }

    /// Names of the streams that are still alive, in creation order
    pub fn live_streams(&self) -> Vec<String> {
        self.inner.streams().values().cloned().collect()
    }

    /// Create a stream.
    ///
    /// The format is validated first, against the engine's limits and then
    /// against the backend; an unsupported combination fails with
    /// `AudioError::InvalidFormat` before any thread is started. The stream
    /// is created stopped; call [`Stream::start`] to begin rendering. There
    /// is no preroll: the data callback is first invoked after `start`.
    pub fn stream_init<D, S>(
        &self,
        name: &str,
        params: StreamParams,
        latency_frames: u32,
        data_callback: D,
        state_callback: S,
    ) -> Result<Stream, AudioError>
    where
        D: FnMut(&mut OutputBuffer<'_>) -> Result<usize, CallbackError> + Send + 'static,
        S: FnMut(StreamState) -> Result<(), CallbackError> + Send + 'static,
    {
        crate::time_operation!(format!("init stream '{}'", name), {
            self.open_stream(
                name,
                params,
                latency_frames,
                Box::new(data_callback),
                Box::new(state_callback),
            )
        })
    }

    fn open_stream(
        &self,
        name: &str,
        params: StreamParams,
        latency_frames: u32,
        data_callback: Box<dyn DataCallback>,
        state_callback: Box<dyn StateCallback>,
    ) -> Result<Stream, AudioError> {
        validate_params(&params, latency_frames)?;
        self.inner.backend.check_format(&params)?;

        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let core = Arc::new(StreamCore::new(
            id,
            name.to_string(),
            params,
            latency_frames,
            data_callback,
            state_callback,
            self.inner.logger.clone(),
        ));

        let endpoint = self
            .inner
            .backend
            .open_output(name, &params, latency_frames, RenderPump::new(Arc::clone(&core)))?;

        self.inner.streams().insert(id, name.to_string());
        self.inner.logger.log_stream_created(name, &params, latency_frames);

        Ok(Stream::new(core, endpoint, Arc::clone(&self.inner)))
    }

    /// Destroy the context.
    ///
    /// # Panics
    ///
    /// Panics if any stream created by this context is still alive.
    pub fn destroy(self) {
        let live = self.live_streams();
        assert!(
            live.is_empty(),
            "context '{}' destroyed while streams are alive: {:?}",
            self.inner.name, live
        );
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let live = self.live_streams();
        if live.is_empty() {
            self.inner.logger.log_context_destroyed(&self.inner.name);
        } else {
            // Backend resources stay alive until those streams go away
            error!(
                "Context '{}' dropped while {} stream(s) are alive: {:?}",
                self.inner.name,
                live.len(),
                live
            );
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.inner.name)
            .field("backend", &self.inner.backend.id())
            .field("live_streams", &self.live_streams())
            .finish()
    }
}

/// Engine-level format limits, checked before the backend is consulted
pub fn validate_params(params: &StreamParams, latency_frames: u32) -> Result<(), AudioError> {
    if params.channels == 0 || params.channels > MAX_CHANNELS {
        return Err(AudioError::invalid_format(format!(
            "{} channels (supported: 1-{})",
            params.channels, MAX_CHANNELS
        )));
    }
    if params.rate == 0 || params.rate > MAX_SAMPLE_RATE {
        return Err(AudioError::invalid_format(format!(
            "{} Hz (supported: 1-{})",
            params.rate, MAX_SAMPLE_RATE
        )));
    }
    if !(MIN_LATENCY_FRAMES..=MAX_LATENCY_FRAMES).contains(&latency_frames) {
        return Err(AudioError::invalid_format(format!(
            "latency of {} frames (supported: {}-{})",
            latency_frames, MIN_LATENCY_FRAMES, MAX_LATENCY_FRAMES
        )));
    }
    debug!("Stream format accepted: {}, latency {} frames", params.describe(), latency_frames);
    Ok(())
}
