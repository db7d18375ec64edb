use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use crate::audio::backend::OutputEndpoint;
use crate::audio::buffer::OutputBuffer;
use crate::audio::context::ContextInner;
use crate::audio::position::{FrameCounter, PositionUpdate, VolumeControl};
use crate::audio::state::{Lifecycle, StateCell};
use crate::audio::{DataCallback, StateCallback};
use crate::error::{AudioError, CallbackError};
use crate::logging::{EngineLogger, OperationTimer};
use crate::models::{StreamParams, StreamState, StreamStats};

/// Stop rendezvous taking longer than this is logged as a warning
const STOP_WARN_THRESHOLD: Duration = Duration::from_millis(100);

fn lock_ignoring_poison<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn silent_data(_buffer: &mut OutputBuffer<'_>) -> Result<usize, CallbackError> {
    Ok(0)
}

fn ignore_state(_state: StreamState) -> Result<(), CallbackError> {
    Ok(())
}

/// State shared between a stream's control handle and its render pump
pub(crate) struct StreamCore {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) params: StreamParams,
    pub(crate) latency_frames: u32,
    pub(crate) state: StateCell,
    pub(crate) position: FrameCounter,
    pub(crate) volume: VolumeControl,
    pub(crate) logger: EngineLogger,
    /// Only ever `try_lock`ed by the render thread; the control thread locks
    /// it to wait out an in-flight callback.
    data_callback: Mutex<Box<dyn DataCallback>>,
    /// Serializes notifications so they never overlap
    state_callback: Mutex<Box<dyn StateCallback>>,
    /// Bumped by every successful start
    run: AtomicU64,
    callbacks: AtomicU64,
    overruns: AtomicU64,
    overflow_reported: AtomicBool,
}

impl StreamCore {
    pub(crate) fn new(
        id: u64,
        name: String,
        params: StreamParams,
        latency_frames: u32,
        data_callback: Box<dyn DataCallback>,
        state_callback: Box<dyn StateCallback>,
        logger: EngineLogger,
    ) -> Self {
        Self {
            id,
            name,
            params,
            latency_frames,
            state: StateCell::new(),
            position: FrameCounter::new(),
            volume: VolumeControl::default(),
            logger,
            data_callback: Mutex::new(data_callback),
            state_callback: Mutex::new(state_callback),
            run: AtomicU64::new(0),
            callbacks: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            overflow_reported: AtomicBool::new(false),
        }
    }

    /// Non-blocking access to the data callback for the render thread.
    ///
    /// `None` when the control thread holds it (a stop is in progress) or a
    /// previous callback panicked.
    pub(crate) fn try_data_callback(&self) -> Option<MutexGuard<'_, Box<dyn DataCallback>>> {
        match self.data_callback.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(_)) => None,
        }
    }

    /// Generation of the current start/stop cycle
    pub(crate) fn run(&self) -> u64 {
        self.run.load(Ordering::Acquire)
    }

    /// Block until no data callback is in flight
    fn wait_for_quiescence(&self) {
        drop(lock_ignoring_poison(&self.data_callback));
    }

    fn lock_notifier(&self) -> MutexGuard<'_, Box<dyn StateCallback>> {
        lock_ignoring_poison(&self.state_callback)
    }

    fn deliver(&self, notifier: &mut Box<dyn StateCallback>, state: StreamState) {
        match state {
            StreamState::Started => self.logger.log_stream_started(&self.name),
            StreamState::Stopped => self.logger.log_stream_stopped(&self.name, self.position.frames()),
            StreamState::Drained => self.logger.log_stream_drained(&self.name, self.position.frames()),
        }
        if let Err(e) = notifier.on_state(state) {
            debug!("State callback of stream '{}' returned {} for {}", self.name, e, state);
        }
    }

    pub(crate) fn notify(&self, state: StreamState) {
        let mut notifier = self.lock_notifier();
        self.deliver(&mut notifier, state);
    }

    pub(crate) fn record_callback(&self, took: Duration, deadline: Duration) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        if took > deadline {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// True the first time a callback over-reports its frame count
    pub(crate) fn first_overflow(&self) -> bool {
        !self.overflow_reported.swap(true, Ordering::Relaxed)
    }

    /// Halt after a callback or device error. Notifies `Stopped` only if this
    /// call performed the transition.
    pub(crate) fn error_stop(&self, reason: &str) -> bool {
        if self
            .state
            .transition_from_any(&[Lifecycle::Started, Lifecycle::Draining], Lifecycle::Stopped)
            .is_none()
        {
            return false;
        }
        self.state.set_errored(true);
        self.logger.log_stream_errored(&self.name, reason);
        self.notify(StreamState::Stopped);
        true
    }

    pub(crate) fn stats(&self) -> StreamStats {
        StreamStats {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames_delivered: self.position.frames(),
            overruns: self.overruns.load(Ordering::Relaxed),
            errored: self.state.is_errored(),
        }
    }

    fn position(&self) -> Result<u64, AudioError> {
        if self.state.load() == Lifecycle::Destroyed {
            return Err(self.destroyed());
        }
        Ok(self.position.frames())
    }

    fn destroyed(&self) -> AudioError {
        AudioError::Backend(format!("stream '{}' has been destroyed", self.name))
    }

    /// Drop the user's callbacks so captured state is released at destroy
    fn release_callbacks(&self) {
        *lock_ignoring_poison(&self.data_callback) = Box::new(silent_data);
        *self.lock_notifier() = Box::new(ignore_state);
    }
}

/// An output stream created by [`Context::stream_init`](crate::audio::Context::stream_init).
///
/// All methods take `&self`; control operations are serialized internally,
/// so a stream can be shared between threads. Dropping the stream destroys
/// it, stopping the render thread first if needed.
pub struct Stream {
    core: Arc<StreamCore>,
    endpoint: Mutex<Option<Box<dyn OutputEndpoint>>>,
    context: Arc<ContextInner>,
}

impl Stream {
    pub(crate) fn new(core: Arc<StreamCore>, endpoint: Box<dyn OutputEndpoint>, context: Arc<ContextInner>) -> Self {
        Self {
            core,
            endpoint: Mutex::new(Some(endpoint)),
            context,
        }
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn params(&self) -> StreamParams {
        self.core.params
    }

    pub fn latency_frames(&self) -> u32 {
        self.core.latency_frames
    }

    /// Full lifecycle state, including the internal draining state
    pub fn lifecycle(&self) -> Lifecycle {
        self.core.state.load()
    }

    /// Public state, `None` before the first start
    pub fn state(&self) -> Option<StreamState> {
        self.core.state.load().public_state()
    }

    /// Start (or restart) rendering.
    ///
    /// Returns once the backend accepts scheduling. Starting a running stream
    /// is a no-op. On failure the stream keeps its previous state and the
    /// call can be retried.
    pub fn start(&self) -> Result<(), AudioError> {
        let mut slot = lock_ignoring_poison(&self.endpoint);
        let endpoint = slot.as_mut().ok_or_else(|| self.core.destroyed())?;

        let previous = self.core.state.load();
        if previous.is_running() {
            debug!("Stream '{}' already started", self.core.name);
            return Ok(());
        }
        if !previous.can_start() {
            return Err(self.core.destroyed());
        }

        // A render that raced an error stop finishes before the new run begins
        self.core.wait_for_quiescence();

        // Held across the backend start so the render thread cannot report a
        // drain or error before `Started` has been delivered.
        let mut notifier = self.core.lock_notifier();
        self.core.state.set_errored(false);
        if !self.core.state.transition(previous, Lifecycle::Started) {
            return Err(AudioError::Backend(format!(
                "stream '{}' changed state during start",
                self.core.name
            )));
        }
        self.core.run.fetch_add(1, Ordering::AcqRel);

        if let Err(e) = endpoint.start() {
            self.core
                .state
                .transition_from_any(&[Lifecycle::Started, Lifecycle::Draining], previous);
            // The render thread takes the notifier while holding the callback
            drop(notifier);
            self.core.wait_for_quiescence();
            self.core.logger.log_backend_error(&self.core.name, &e.to_string());
            return Err(e);
        }

        self.core.deliver(&mut notifier, StreamState::Started);
        Ok(())
    }

    /// Stop rendering and wait for the render thread to quiesce.
    ///
    /// After this returns the data callback will not be invoked again until
    /// the next `start`. Stopping a stream that is not running succeeds
    /// without a notification.
    pub fn stop(&self) -> Result<(), AudioError> {
        let mut slot = lock_ignoring_poison(&self.endpoint);
        let endpoint = slot.as_mut().ok_or_else(|| self.core.destroyed())?;
        self.stop_endpoint(endpoint.as_mut())
    }

    fn stop_endpoint(&self, endpoint: &mut dyn OutputEndpoint) -> Result<(), AudioError> {
        let timer = OperationTimer::new(format!("stop stream '{}'", self.core.name));

        let previous = self
            .core
            .state
            .transition_from_any(&[Lifecycle::Started, Lifecycle::Draining], Lifecycle::Stopped);
        self.core.wait_for_quiescence();
        let halted = endpoint.stop();

        if previous.is_some() {
            self.core.notify(StreamState::Stopped);
        }
        timer.finish_with_threshold(STOP_WARN_THRESHOLD);

        if let Err(e) = &halted {
            self.core.logger.log_backend_error(&self.core.name, &e.to_string());
        }
        halted
    }

    /// Frames delivered to the backend so far
    pub fn position(&self) -> Result<u64, AudioError> {
        self.core.position()
    }

    /// Set the linear output volume. Values outside [0.0, 1.0] are clamped.
    pub fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        let applied = self.core.volume.set(volume);
        if applied != volume {
            debug!("Volume {} for stream '{}' clamped to {}", volume, self.core.name, applied);
        }
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.core.volume.get()
    }

    pub fn stats(&self) -> StreamStats {
        self.core.stats()
    }

    /// Read-only handle for observing the stream from other threads
    pub fn monitor(&self) -> StreamMonitor {
        StreamMonitor { core: Arc::clone(&self.core) }
    }

    /// Destroy the stream; equivalent to dropping it
    pub fn destroy(self) {
        drop(self);
    }

    fn shutdown(&mut self) {
        let endpoint = self
            .endpoint
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(mut endpoint) = endpoint {
            if let Err(e) = self.stop_endpoint(endpoint.as_mut()) {
                warn!("Failed to stop stream '{}' during destroy: {}", self.core.name, e);
            }
            // Joins the render thread
            drop(endpoint);
        }

        self.core.state.replace(Lifecycle::Destroyed);
        self.core.release_callbacks();
        self.context.unregister(self.core.id);

        let stats = self.core.stats();
        self.core.logger.log_stream_destroyed(&self.core.name, stats.frames_delivered);
        if stats.overruns > 0 {
            self.core.logger.log_callback_overruns(&self.core.name, stats.overruns, stats.callbacks);
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("params", &self.core.params)
            .field("state", &self.core.state.load())
            .finish()
    }
}

/// Cloneable read-only view of a stream, usable after the stream is gone
#[derive(Clone)]
pub struct StreamMonitor {
    core: Arc<StreamCore>,
}

impl StreamMonitor {
    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn params(&self) -> StreamParams {
        self.core.params
    }

    /// Fails with `AudioError::Backend` once the stream is destroyed
    pub fn position(&self) -> Result<u64, AudioError> {
        self.core.position()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.core.state.load()
    }

    pub fn state(&self) -> Option<StreamState> {
        self.core.state.load().public_state()
    }

    pub fn volume(&self) -> f32 {
        self.core.volume.get()
    }

    pub fn stats(&self) -> StreamStats {
        self.core.stats()
    }

    pub fn position_update(&self, total_frames: Option<u64>) -> PositionUpdate {
        PositionUpdate::new(self.core.position.frames(), &self.core.params, self.state(), total_frames)
    }
}
